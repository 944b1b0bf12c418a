pub mod anthropic;
pub mod openai;
#[cfg(test)]
pub mod testing;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Prefix carried by the text rendering of a failed model call.
pub const FAILURE_PREFIX: &str = "API call failed: ";

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One attempt's worth of request data handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("no API key configured")]
    MissingApiKey,
    #[error("HTTP request failed: {0}")]
    Transport(String),
    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed API response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::MissingApiKey => false,
            GatewayError::Status { status, .. } => *status == 429 || *status >= 500,
            GatewayError::Transport(_) | GatewayError::MalformedResponse(_) => true,
        }
    }
}

// ── Backend seam ────────────────────────────────────────────────────────

/// A single round trip to a text-generation service.
#[allow(async_fn_in_trait)]
pub trait ChatBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError>;
}

/// The configured HTTP backend, chosen at startup.
pub enum HttpBackend {
    OpenAi(openai::OpenAiBackend),
    Anthropic(anthropic::AnthropicBackend),
}

impl ChatBackend for HttpBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        match self {
            HttpBackend::OpenAi(backend) => backend.complete(request).await,
            HttpBackend::Anthropic(backend) => backend.complete(request).await,
        }
    }
}

// ── Reply ───────────────────────────────────────────────────────────────

/// Outcome of a gateway invocation. A failure is an ordinary value: every
/// caller still runs its parser over [`ModelReply::text`].
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    Failed { attempts: u32, error: String },
}

impl ModelReply {
    pub fn is_failure(&self) -> bool {
        matches!(self, ModelReply::Failed { .. })
    }

    /// The response text, or the sentinel failure string.
    pub fn text(&self) -> String {
        match self {
            ModelReply::Text(text) => text.clone(),
            ModelReply::Failed { error, .. } => format!("{}{}", FAILURE_PREFIX, error),
        }
    }
}

// ── Gateway ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Bounded-retry wrapper around a [`ChatBackend`]. Stateless between calls.
pub struct ModelGateway<B> {
    backend: B,
    policy: RetryPolicy,
}

impl<B: ChatBackend> ModelGateway<B> {
    pub fn new(backend: B, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Send `messages` to the backend, retrying transient failures with a
    /// fixed backoff. Never returns an error; exhaustion yields
    /// [`ModelReply::Failed`] with the last error message.
    pub async fn invoke(&self, messages: Vec<ChatMessage>, temperature: f32) -> ModelReply {
        let temperature = if temperature.is_finite() {
            temperature.clamp(0.0, 1.0)
        } else {
            warn!("Temperature {} is not finite, sending 0", temperature);
            0.0
        };
        let request = ChatRequest { messages, temperature };
        let max_attempts = self.policy.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.backend.complete(&request).await {
                Ok(text) => {
                    info!("Model call succeeded (attempt {}/{})", attempt, max_attempts);
                    return ModelReply::Text(text);
                }
                Err(e) => {
                    warn!("Model call failed (attempt {}/{}): {}", attempt, max_attempts, e);
                    if !e.is_transient() || attempt >= max_attempts {
                        if e.is_transient() {
                            warn!("Model call retries exhausted");
                        }
                        return ModelReply::Failed {
                            attempts: attempt,
                            error: e.to_string(),
                        };
                    }
                    tokio::time::sleep(self.policy.backoff).await;
                }
            }
        }
    }
}
