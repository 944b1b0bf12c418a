use tracing::debug;

use super::{ChatBackend, ChatRequest, GatewayError, Role};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API backend. System messages are lifted into the
/// top-level `system` field.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    url: String,
}

impl AnthropicBackend {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.into(),
            max_tokens: 1024,
            url: MESSAGES_URL.to_string(),
        }
    }

    /// Point the backend at a different messages endpoint (proxies, mocks).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn body(&self, request: &ChatRequest) -> serde_json::Value {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| serde_json::json!({ "role": "user", "content": m.content }))
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": request.temperature,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system.join("\n\n"));
        }
        body
    }
}

impl ChatBackend for AnthropicBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let api_key = self.api_key.as_deref().ok_or(GatewayError::MissingApiKey)?;

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status, body });
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        let text = resp_json["content"][0]["text"]
            .as_str()
            .ok_or_else(|| GatewayError::MalformedResponse("no text in response".to_string()))?;
        debug!("Anthropic response: {} chars", text.chars().count());
        Ok(text.to_string())
    }
}
