//! Rate-limited, bounded-concurrency dispatch to the inference provider.
//!
//! Every attempt against the external service passes through here: a
//! concurrency slot (at most `worker_budget` calls in flight), then a
//! rate-limit token (long-run attempt rate bounded by the token bucket),
//! then a per-attempt timeout. Transient failures retry with jittered
//! exponential backoff up to `max_retries`; permanent failures are terminal
//! immediately. Slot and token acquisition is scoped, so release happens on
//! every exit path, and a task sleeping through backoff holds neither.
//!
//! Oversized files are split into line-aligned pieces; each piece is its own
//! sequence of attempts and the per-piece facts are merged at the end.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::chunk::split_source;
use crate::config::DispatchConfig;
use crate::limiter::TokenBucket;
use crate::models::{FailureKind, FailureRecord, FileAnalysis, SourceFile};
use crate::provider::{AnalysisRequest, DispatchError, InferenceProvider};

pub struct Dispatcher {
    provider: Arc<dyn InferenceProvider>,
    slots: Semaphore,
    bucket: TokenBucket,
    config: DispatchConfig,
    max_chunk_chars: usize,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        config: DispatchConfig,
        max_chunk_chars: usize,
    ) -> Self {
        Self {
            slots: Semaphore::new(config.worker_budget),
            bucket: TokenBucket::new(config.rate_limit, config.burst_capacity),
            provider,
            config,
            max_chunk_chars,
        }
    }

    /// Analyze one file to a terminal state.
    ///
    /// Failures are returned as values, tagged with the last error kind and
    /// total attempt count; they never propagate into other in-flight
    /// dispatches.
    pub async fn dispatch(&self, file: &SourceFile) -> Result<FileAnalysis, FailureRecord> {
        let pieces = split_source(&file.content, self.max_chunk_chars);
        let parts = pieces.len();

        let mut merged = FileAnalysis::default();
        let mut total_attempts = 0u32;

        for (index, piece) in pieces.iter().enumerate() {
            match self.call_with_retry(file, piece, index + 1, parts).await {
                Ok((facts, attempts)) => {
                    total_attempts += attempts;
                    merge_facts(&mut merged, facts);
                }
                Err((error, attempts)) => {
                    return Err(FailureRecord {
                        path: file.relative.clone(),
                        kind: error.kind,
                        message: error.message,
                        attempts: total_attempts + attempts,
                    });
                }
            }
        }

        if merged.language.is_none() {
            merged.language = Some(file.language.clone());
        }
        Ok(merged)
    }

    async fn call_with_retry(
        &self,
        file: &SourceFile,
        content: &str,
        part: usize,
        parts: usize,
    ) -> Result<(FileAnalysis, u32), (DispatchError, u32)> {
        let mut last_error: Option<DispatchError> = None;
        let mut attempts = 0u32;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(
                    self.config.backoff_base_ms,
                    self.config.backoff_jitter,
                    attempt,
                ))
                .await;
            }
            attempts += 1;

            // Slot for the duration of this attempt only; dropped before any
            // backoff sleep.
            let slot = self
                .slots
                .acquire()
                .await
                .expect("dispatch slots never close");
            self.bucket.acquire().await;

            let request = AnalysisRequest {
                path: &file.relative,
                language: &file.language,
                content,
                part,
                parts,
            };
            let outcome = tokio::time::timeout(
                Duration::from_secs(self.config.attempt_timeout_secs),
                self.provider.analyze(request),
            )
            .await;
            drop(slot);

            match outcome {
                Ok(Ok(facts)) => return Ok((facts, attempts)),
                Ok(Err(error)) if error.is_transient() => last_error = Some(error),
                Ok(Err(error)) => return Err((error, attempts)),
                Err(_elapsed) => {
                    last_error = Some(DispatchError::new(
                        FailureKind::Timeout,
                        format!(
                            "attempt exceeded {}s timeout",
                            self.config.attempt_timeout_secs
                        ),
                    ));
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            DispatchError::new(FailureKind::ServerError, "retries exhausted")
        });
        Err((error, attempts))
    }
}

/// Exponential backoff with uniform jitter: `base · 2^(attempt-1)` plus up to
/// `jitter` of itself, with the exponent capped.
fn backoff_delay(base_ms: u64, jitter: f64, attempt: u32) -> Duration {
    let exp = (attempt.saturating_sub(1)).min(5);
    let base = Duration::from_millis(base_ms.saturating_mul(1 << exp));
    let jittered = base.as_secs_f64() * (1.0 + jitter * rand::random::<f64>());
    Duration::from_secs_f64(jittered)
}

/// Merge one piece's facts into the accumulated analysis for the file.
/// Declarations, imports, and calls are unioned; summaries concatenate.
fn merge_facts(merged: &mut FileAnalysis, piece: FileAnalysis) {
    if merged.language.is_none() {
        merged.language = piece.language;
    }
    if !piece.summary.is_empty() {
        if merged.summary.is_empty() {
            merged.summary = piece.summary;
        } else {
            merged.summary.push_str("\n\n");
            merged.summary.push_str(&piece.summary);
        }
    }
    match (&mut merged.insights, piece.insights) {
        (Some(existing), Some(incoming)) => {
            existing.push_str("\n\n");
            existing.push_str(&incoming);
        }
        (insights @ None, incoming) => *insights = incoming,
        _ => {}
    }

    for function in piece.functions {
        if !merged
            .functions
            .iter()
            .any(|f| f.name == function.name && f.class == function.class)
        {
            merged.functions.push(function);
        }
    }
    for class in piece.classes {
        if !merged.classes.iter().any(|c| c.name == class.name) {
            merged.classes.push(class);
        }
    }
    for import in piece.imports {
        if !merged.imports.contains(&import) {
            merged.imports.push(import);
        }
    }
    for call in piece.calls {
        if !merged
            .calls
            .iter()
            .any(|c| c.caller == call.caller && c.callee == call.callee)
        {
            merged.calls.push(call);
        }
    }
}
