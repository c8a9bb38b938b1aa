//! Source-tree traversal.
//!
//! Walks the analysis root, applies include/exclude globs and the supported
//! language set, and produces [`SourceFile`]s in a deterministic order. This
//! is the producer side of the pipeline; it makes no judgment about file
//! content beyond language detection and a size cutoff.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::TraversalConfig;
use crate::models::SourceFile;

/// Map a file extension to its language tag. Unknown extensions are skipped.
pub fn detect_language(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let language = match extension.as_str() {
        "py" => "Python",
        "js" => "JavaScript",
        "jsx" => "JavaScript",
        "ts" => "TypeScript",
        "tsx" => "TypeScript",
        "cpp" | "cc" | "cxx" => "C++",
        "c" => "C",
        "h" => "C/C++ Header",
        "hpp" => "C++ Header",
        "java" => "Java",
        "cs" => "C#",
        "php" => "PHP",
        "rb" => "Ruby",
        "go" => "Go",
        "rs" => "Rust",
        "swift" => "Swift",
        "kt" => "Kotlin",
        "scala" => "Scala",
        "m" => "Objective-C",
        "mm" => "Objective-C++",
        "pl" => "Perl",
        "sh" => "Shell Script",
        "sql" => "SQL",
        _ => return None,
    };
    Some(language)
}

/// Scan the configured root and return analyzable files in sorted order.
pub fn scan_tree(config: &TraversalConfig, root_override: Option<&Path>) -> Result<Vec<SourceFile>> {
    let root = root_override.unwrap_or(&config.root);
    if !root.exists() {
        bail!("Analysis root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/__pycache__/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        let Some(language) = detect_language(path) else {
            continue;
        };
        if !config.languages.is_empty()
            && !config.languages.iter().any(|l| l.eq_ignore_ascii_case(language))
        {
            continue;
        }

        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size_bytes > config.max_file_bytes {
            eprintln!(
                "Warning: skipping {} ({} bytes exceeds traversal.max_file_bytes)",
                rel_str, size_bytes
            );
            continue;
        }

        let content = match std::fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                eprintln!("Warning: skipping unreadable file {}: {}", rel_str, e);
                continue;
            }
        };

        files.push(SourceFile {
            path: path.to_path_buf(),
            relative: rel_str,
            language: language.to_string(),
            content,
            size_bytes,
        });
    }

    // Sort for deterministic scheduling order
    files.sort_by(|a, b| a.relative.cmp(&b.relative));

    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config_for(root: &Path) -> TraversalConfig {
        TraversalConfig {
            root: root.to_path_buf(),
            ..TraversalConfig::default()
        }
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Path::new("a.py")), Some("Python"));
        assert_eq!(detect_language(Path::new("lib/foo.rs")), Some("Rust"));
        assert_eq!(detect_language(Path::new("notes.txt")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
    }

    #[test]
    fn test_scan_sorted_and_filtered() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("b.py"), "def b(): pass\n").unwrap();
        fs::write(tmp.path().join("a.py"), "def a(): pass\n").unwrap();
        fs::write(tmp.path().join("readme.md"), "# nope\n").unwrap();

        let files = scan_tree(&config_for(tmp.path()), None).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["a.py", "b.py"]);
        assert_eq!(files[0].language, "Python");
    }

    #[test]
    fn test_scan_respects_language_allowlist() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "x = 1\n").unwrap();
        fs::write(tmp.path().join("b.rs"), "fn b() {}\n").unwrap();

        let mut config = config_for(tmp.path());
        config.languages = vec!["rust".to_string()];
        let files = scan_tree(&config, None).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, "b.rs");
    }

    #[test]
    fn test_scan_respects_excludes() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("vendor")).unwrap();
        fs::write(tmp.path().join("vendor/dep.py"), "x = 1\n").unwrap();
        fs::write(tmp.path().join("main.py"), "x = 1\n").unwrap();

        let mut config = config_for(tmp.path());
        config.exclude_globs = vec!["vendor/**".to_string()];
        let files = scan_tree(&config, None).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, "main.py");
    }

    #[test]
    fn test_scan_skips_oversized_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("big.py"), "x".repeat(128)).unwrap();
        fs::write(tmp.path().join("small.py"), "x = 1\n").unwrap();

        let mut config = config_for(tmp.path());
        config.max_file_bytes = 64;
        let files = scan_tree(&config, None).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, "small.py");
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let config = config_for(Path::new("/definitely/not/here"));
        assert!(scan_tree(&config, None).is_err());
    }
}
