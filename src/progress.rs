//! Analysis progress reporting.
//!
//! Reports observable progress during `atlas analyze` so users see what is
//! being scanned, how many files are done, and how many came from cache or
//! failed. Progress is emitted on **stderr** so stdout remains parseable for
//! scripts.

use std::io::Write;

/// A single progress event for an analysis run.
#[derive(Clone, Debug)]
pub enum AnalyzeProgressEvent {
    /// Traversal is scanning the source tree. Total unknown.
    Scanning { root: String },
    /// Files are reaching terminal states: n done out of total.
    Analyzing {
        n: u64,
        total: u64,
        cached: u64,
        failed: u64,
    },
}

/// Reports analysis progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the orchestrator's consumer loop.
    fn report(&self, event: AnalyzeProgressEvent);
}

/// Human-friendly progress on stderr:
/// "analyze  123 / 400 files (45 cached, 2 failed)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: AnalyzeProgressEvent) {
        let line = match &event {
            AnalyzeProgressEvent::Scanning { root } => {
                format!("analyze {}  scanning...\n", root)
            }
            AnalyzeProgressEvent::Analyzing {
                n,
                total,
                cached,
                failed,
            } => {
                format!(
                    "analyze  {} / {} files ({} cached, {} failed)\n",
                    n, total, cached, failed
                )
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: AnalyzeProgressEvent) {
        let obj = match &event {
            AnalyzeProgressEvent::Scanning { root } => serde_json::json!({
                "event": "progress",
                "phase": "scanning",
                "root": root
            }),
            AnalyzeProgressEvent::Analyzing {
                n,
                total,
                cached,
                failed,
            } => serde_json::json!({
                "event": "progress",
                "phase": "analyzing",
                "n": n,
                "total": total,
                "cached": cached,
                "failed": failed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: AnalyzeProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    /// Build a reporter for this mode. Caller passes it to the orchestrator.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
