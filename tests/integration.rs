use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn atlas_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("atlas");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    // Create config
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    // Create a small source tree
    let src_dir = root.join("project");
    fs::create_dir_all(&src_dir).unwrap();
    fs::write(
        src_dir.join("a.py"),
        "import os\n\ndef foo():\n    bar()\n",
    )
    .unwrap();
    fs::write(src_dir.join("b.py"), "def bar():\n    return 42\n").unwrap();
    fs::write(src_dir.join("notes.md"), "# not source\n").unwrap();

    let config_content = format!(
        r#"[storage]
cache_path = "{root}/data/atlas-cache.sqlite"
output_dir = "{root}/atlas-out"

[traversal]
root = "{root}/project"

[dispatch]
worker_budget = 2
rate_limit = 10.0
burst_capacity = 5
"#,
        root = root.display()
    );

    let config_path = config_dir.join("atlas.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_atlas(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = atlas_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run atlas binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_cache() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_atlas(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_atlas(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_atlas(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_analyze_dry_run_counts_files() {
    let (_tmp, config_path) = setup_test_env();

    run_atlas(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_atlas(&config_path, &["analyze", "--dry-run", "--progress", "off"]);
    assert!(
        success,
        "dry-run failed: stdout={}, stderr={}",
        stdout, stderr
    );
    // Two .py files; the markdown file is not a supported language.
    assert!(stdout.contains("files found: 2"), "stdout: {}", stdout);
    assert!(stdout.contains("cache hits: 0"), "stdout: {}", stdout);
    assert!(stdout.contains("dispatches needed: 2"), "stdout: {}", stdout);
}

#[test]
fn test_analyze_without_provider_is_config_error() {
    let (_tmp, config_path) = setup_test_env();

    run_atlas(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_atlas(&config_path, &["analyze", "--progress", "off"]);
    assert!(!success, "analyze should fail without a provider");
    let combined = format!("{}{}", stdout, stderr);
    assert!(
        combined.contains("provider is disabled"),
        "expected a provider configuration error, got: {}",
        combined
    );
}

#[test]
fn test_cache_stats_on_empty_cache() {
    let (_tmp, config_path) = setup_test_env();

    run_atlas(&config_path, &["init"]);
    let (stdout, stderr, success) = run_atlas(&config_path, &["cache", "stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Entries:    0"), "stdout: {}", stdout);
}

#[test]
fn test_cache_evict_requires_a_policy() {
    let (_tmp, config_path) = setup_test_env();

    run_atlas(&config_path, &["init"]);
    let (_, stderr, success) = run_atlas(&config_path, &["cache", "evict"]);
    assert!(!success);
    assert!(stderr.contains("--older-than-days"), "stderr: {}", stderr);
}

#[test]
fn test_limit_caps_dry_run() {
    let (_tmp, config_path) = setup_test_env();

    run_atlas(&config_path, &["init"]);
    let (stdout, _, success) = run_atlas(
        &config_path,
        &["analyze", "--dry-run", "--limit", "1", "--progress", "off"],
    );
    assert!(success);
    assert!(stdout.contains("files found: 1"), "stdout: {}", stdout);
}
