//! Core data models used throughout Code Atlas.
//!
//! These types represent the source files, per-file analysis facts, and
//! outcomes that flow through the analysis pipeline.

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// A source file produced by the traversal scan, before analysis.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Absolute path on disk.
    pub path: std::path::PathBuf,
    /// Path relative to the analysis root, used as the stable identity.
    pub relative: String,
    /// Detected language tag (e.g. `"Python"`, `"Rust"`).
    pub language: String,
    /// File content, read as (lossy) UTF-8.
    pub content: String,
    pub size_bytes: u64,
}

/// A function declared in a file, as reported by the inference service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionFact {
    pub name: String,
    /// Enclosing class, when the function is a method.
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// A class declared in a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassFact {
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
}

/// An observed call from a function in this file to a callee identifier.
///
/// The callee is a bare identifier; resolution against declarations across
/// the analyzed set happens in the graph builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallFact {
    pub caller: String,
    pub callee: String,
}

/// Structured facts for one file, as returned by the inference service.
///
/// This is the validated form of whatever the provider produced. Extra
/// fields in the provider response are ignored at the parse boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileAnalysis {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub functions: Vec<FunctionFact>,
    #[serde(default)]
    pub classes: Vec<ClassFact>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub calls: Vec<CallFact>,
    /// Free-text observations (patterns, potential issues).
    #[serde(default)]
    pub insights: Option<String>,
}

/// Classification of a dispatch failure.
///
/// Transient kinds are retried with backoff; permanent kinds fail the file
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Throttled,
    ServerError,
    Network,
    BadRequest,
    Auth,
    UnsupportedContent,
    InvalidResponse,
}

impl FailureKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureKind::Timeout
                | FailureKind::Throttled
                | FailureKind::ServerError
                | FailureKind::Network
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Throttled => "throttled",
            FailureKind::ServerError => "server_error",
            FailureKind::Network => "network",
            FailureKind::BadRequest => "bad_request",
            FailureKind::Auth => "auth",
            FailureKind::UnsupportedContent => "unsupported_content",
            FailureKind::InvalidResponse => "invalid_response",
        }
    }
}

/// Terminal failure for one file, carried through the result stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub path: String,
    pub kind: FailureKind,
    pub message: String,
    /// Attempts made before the failure became terminal.
    pub attempts: u32,
}

/// Terminal state of one file within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Analyzed {
        analysis: FileAnalysis,
        from_cache: bool,
    },
    Failed { failure: FailureRecord },
}

/// One element of the orchestrator's produced stream: a file plus its
/// terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub relative: String,
    pub language: String,
    pub fingerprint: Fingerprint,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl FileOutcome {
    pub fn analysis(&self) -> Option<&FileAnalysis> {
        match &self.outcome {
            Outcome::Analyzed { analysis, .. } => Some(analysis),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(
            self.outcome,
            Outcome::Analyzed {
                from_cache: true,
                ..
            }
        )
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        match &self.outcome {
            Outcome::Failed { failure } => Some(failure),
            Outcome::Analyzed { .. } => None,
        }
    }
}
