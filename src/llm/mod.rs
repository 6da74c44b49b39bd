// src/llm/mod.rs
// Model boundary: a single text-completion capability behind a trait so the
// pipeline runs identically against the real API or a deterministic stub.

pub mod anthropic;
pub mod json;

use async_trait::async_trait;

pub use anthropic::AnthropicClient;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("malformed model output: {0}")]
    Malformed(String),
}

/// Text completion: prompt in, text out. Callers must tolerate the returned
/// text failing to parse as the JSON they asked for, and must have a
/// deterministic fallback for when no client is wired at all.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError>;
}
