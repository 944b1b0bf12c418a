use tracing::debug;

use super::{ChatBackend, ChatRequest, GatewayError};

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

/// Backend for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn body(&self, request: &ChatRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "stream": false,
        })
    }
}

impl ChatBackend for OpenAiBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let api_key = self.api_key.as_deref().ok_or(GatewayError::MissingApiKey)?;

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
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

        let text = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| GatewayError::MalformedResponse("no message content in response".to_string()))?;
        debug!("Chat completion response: {} chars", text.chars().count());
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChatMessage;

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let backend = OpenAiBackend::new(None, "https://example.test/v1/", "m");
        assert_eq!(backend.endpoint(), "https://example.test/v1/chat/completions");
    }

    #[test]
    fn body_carries_role_tagged_messages() {
        let backend = OpenAiBackend::new(None, DEFAULT_BASE_URL, "deepseek-chat");
        let body = backend.body(&ChatRequest {
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("usr")],
            temperature: 0.2,
        });
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["stream"], false);
        assert_eq!(body["model"], "deepseek-chat");
    }
}
