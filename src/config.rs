use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// SQLite analysis cache location.
    pub cache_path: PathBuf,
    /// Directory for produced artifacts (results, graph snapshots, summary).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./atlas-out")
}

#[derive(Debug, Deserialize, Clone)]
pub struct TraversalConfig {
    /// Root of the source tree to analyze. Overridable on the command line.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Language allowlist. Empty means every supported language.
    #[serde(default)]
    pub languages: Vec<String>,
    /// Files larger than this are skipped outright.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            languages: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_max_file_bytes() -> u64 {
    2 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// `"openrouter"` or `"disabled"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Files longer than this are analyzed chunk by chunk.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}
fn default_max_chunk_chars() -> usize {
    70_000
}

impl ProviderConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    /// Maximum provider calls in flight at any instant (W).
    #[serde(default = "default_worker_budget")]
    pub worker_budget: usize,
    /// Token-bucket refill rate in tokens per second (R).
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    /// Token-bucket burst capacity (B).
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: u32,
    /// Maximum retries after the first attempt (K).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Fraction of the backoff delay added as uniform jitter, in [0, 1].
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_budget: default_worker_budget(),
            rate_limit: default_rate_limit(),
            burst_capacity: default_burst_capacity(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_jitter: default_backoff_jitter(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

fn default_worker_budget() -> usize {
    5
}
fn default_rate_limit() -> f64 {
    1.0
}
fn default_burst_capacity() -> u32 {
    5
}
fn default_max_retries() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_backoff_jitter() -> f64 {
    0.5
}
fn default_attempt_timeout_secs() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate dispatch
    if config.dispatch.worker_budget == 0 {
        anyhow::bail!("dispatch.worker_budget must be >= 1");
    }
    if config.dispatch.rate_limit <= 0.0 || !config.dispatch.rate_limit.is_finite() {
        anyhow::bail!("dispatch.rate_limit must be a positive number of tokens per second");
    }
    if config.dispatch.burst_capacity == 0 {
        anyhow::bail!("dispatch.burst_capacity must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.dispatch.backoff_jitter) {
        anyhow::bail!("dispatch.backoff_jitter must be in [0.0, 1.0]");
    }
    if config.dispatch.attempt_timeout_secs == 0 {
        anyhow::bail!("dispatch.attempt_timeout_secs must be >= 1");
    }

    // Validate traversal
    if config.traversal.include_globs.is_empty() {
        anyhow::bail!("traversal.include_globs must not be empty");
    }
    if config.traversal.max_file_bytes == 0 {
        anyhow::bail!("traversal.max_file_bytes must be > 0");
    }

    // Validate provider
    if config.provider.is_enabled() {
        if config.provider.model.is_none() {
            anyhow::bail!(
                "provider.model must be specified when provider is '{}'",
                config.provider.provider
            );
        }
        if config.provider.max_chunk_chars == 0 {
            anyhow::bail!("provider.max_chunk_chars must be > 0");
        }
    }

    match config.provider.provider.as_str() {
        "disabled" | "openrouter" => {}
        other => anyhow::bail!(
            "Unknown inference provider: '{}'. Must be disabled or openrouter.",
            other
        ),
    }

    Ok(config)
}
