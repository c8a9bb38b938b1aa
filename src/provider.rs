//! Inference provider abstraction and implementations.
//!
//! Defines the [`InferenceProvider`] trait (the external "classify file to
//! structured facts" capability) and the production implementation backed by
//! an OpenRouter-compatible chat-completions API. The provider is treated as
//! an untrusted black box: its output is parsed and validated here at the
//! boundary, with unknown fields ignored, and every failure is classified
//! into the transient/permanent taxonomy the dispatcher retries on.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::models::{FailureKind, FileAnalysis};

/// A dispatch-boundary failure, tagged with its retry classification.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {message}", .kind.as_str())]
pub struct DispatchError {
    pub kind: FailureKind,
    pub message: String,
}

impl DispatchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// One analysis request: a file (or one piece of an oversized file).
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub path: &'a str,
    pub language: &'a str,
    pub content: &'a str,
    /// 1-based piece index and total piece count for chunked files.
    pub part: usize,
    pub parts: usize,
}

/// The external inference capability. Asynchronous, fallible, rate-limited
/// server-side; callers go through the dispatcher rather than calling this
/// directly.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Returns the model identifier used for analysis.
    fn model_name(&self) -> &str;

    /// Analyze one piece of source and return its structured facts.
    async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<FileAnalysis, DispatchError>;
}

/// Create the configured [`InferenceProvider`].
///
/// A disabled provider is a configuration error here, detected before any
/// dispatch begins, per the run-level failure policy.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn InferenceProvider>> {
    match config.provider.as_str() {
        "openrouter" => Ok(Arc::new(OpenRouterProvider::new(config)?)),
        "disabled" => bail!("Inference provider is disabled. Set [provider] provider in config."),
        other => bail!("Unknown inference provider: {}", other),
    }
}

// ============ OpenRouter Provider ============

/// Provider backed by an OpenRouter-compatible `POST /chat/completions` API.
///
/// The model is instructed to answer with a single strict-JSON object
/// describing the file's declarations, imports, and calls; anything else it
/// includes (markdown fences, extra fields) is tolerated at the parse layer.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
}

impl OpenRouterProvider {
    /// # Errors
    ///
    /// Returns an error if `model` is not set in config or the API key
    /// environment variable is missing.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("provider.model required for OpenRouter provider"))?;

        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        Ok(Self {
            client: reqwest::Client::new(),
            model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn build_prompt(request: &AnalysisRequest<'_>) -> String {
        let part_note = if request.parts > 1 {
            format!(" (piece {}/{})", request.part, request.parts)
        } else {
            String::new()
        };
        format!(
            "Analyze the following {} file{}:\n\nFile: {}\n\n{}\n\n\
             Respond with a single JSON object and nothing else, using this shape:\n\
             {{\n\
             \x20 \"summary\": \"one-paragraph purpose of the file\",\n\
             \x20 \"functions\": [{{\"name\": \"...\", \"class\": null, \"summary\": \"...\"}}],\n\
             \x20 \"classes\": [{{\"name\": \"...\", \"summary\": \"...\"}}],\n\
             \x20 \"imports\": [\"...\"],\n\
             \x20 \"calls\": [{{\"caller\": \"...\", \"callee\": \"...\"}}],\n\
             \x20 \"insights\": \"notable patterns and potential issues\"\n\
             }}",
            request.language, part_note, request.path, request.content
        )
    }
}

#[async_trait]
impl InferenceProvider for OpenRouterProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<FileAnalysis, DispatchError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a code analysis assistant. You extract declared \
                                functions, classes, imports, and function calls from source \
                                files and answer in strict JSON only.",
                },
                {
                    "role": "user",
                    "content": Self::build_prompt(&request),
                }
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let kind = classify_status(status.as_u16());
            return Err(DispatchError::new(
                kind,
                format!("API error {}: {}", status, truncate(&detail, 300)),
            ));
        }

        let json: Value = response.json().await.map_err(|e| {
            DispatchError::new(FailureKind::InvalidResponse, format!("invalid body: {}", e))
        })?;

        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                DispatchError::new(
                    FailureKind::InvalidResponse,
                    "unexpected API response structure",
                )
            })?;

        parse_facts(content)
    }
}

/// Map an HTTP status onto the failure taxonomy.
pub fn classify_status(status: u16) -> FailureKind {
    match status {
        408 => FailureKind::Timeout,
        429 => FailureKind::Throttled,
        401 | 403 => FailureKind::Auth,
        415 => FailureKind::UnsupportedContent,
        500..=599 => FailureKind::ServerError,
        _ => FailureKind::BadRequest,
    }
}

fn network_error(e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::new(FailureKind::Timeout, e.to_string())
    } else {
        DispatchError::new(FailureKind::Network, e.to_string())
    }
}

/// Parse the model's reply into [`FileAnalysis`].
///
/// Tolerates markdown code fences and prose around the JSON object; unknown
/// fields inside it are ignored. An unparseable reply is a permanent
/// invalid-response failure; retrying the identical request is not expected
/// to repair it.
pub fn parse_facts(content: &str) -> Result<FileAnalysis, DispatchError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &content[s..=e],
        _ => {
            return Err(DispatchError::new(
                FailureKind::InvalidResponse,
                "no JSON object in model reply",
            ))
        }
    };

    serde_json::from_str::<FileAnalysis>(json).map_err(|e| {
        DispatchError::new(
            FailureKind::InvalidResponse,
            format!("malformed facts: {}", e),
        )
    })
}

fn truncate(text: &str, max: usize) -> &str {
    let mut end = text.len().min(max);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
