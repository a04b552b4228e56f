use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ExpectedShape, LanguageCapability};
use crate::error::GenerationFailure;
use crate::security::SecretValue;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Language capability backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiChat {
    client: Client,
    api_key: SecretValue,
    model: String,
    base_url: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(api_key: SecretValue, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            temperature: 0.0,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn request_body(&self, prompt: &str, shape: ExpectedShape) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": shape.instruction() },
                { "role": "user", "content": prompt },
            ],
        });

        if shape == ExpectedShape::StructuredDecision {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        body
    }
}

#[async_trait]
impl LanguageCapability for OpenAiChat {
    async fn generate(
        &self,
        prompt: &str,
        shape: ExpectedShape,
    ) -> Result<String, GenerationFailure> {
        debug!(model = %self.model, ?shape, prompt_len = prompt.len(), "chat completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(&self.request_body(prompt, shape))
            .send()
            .await
            .map_err(|err| GenerationFailure::new(format!("network error: {err}"), true))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => GenerationFailure::new(format!("authentication failed: {text}"), false),
                429 => GenerationFailure::new("rate limit exceeded", true),
                _ => GenerationFailure::new(format!("status {status}: {text}"), status.is_server_error()),
            });
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|err| GenerationFailure::new(format!("invalid response: {err}"), false))?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| GenerationFailure::new("no content in completion", false))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_decision_requests_json_object() {
        let chat = OpenAiChat::new(SecretValue::new("sk-test"), "gpt-4o")
            .with_base_url("http://localhost:9999/v1/");
        let body = chat.request_body("judge", ExpectedShape::StructuredDecision);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][1]["content"], "judge");
        assert_eq!(chat.base_url, "http://localhost:9999/v1");

        let body = chat.request_body("write", ExpectedShape::FreeText);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn completion_payload_deserializes() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"web"}}]}"#;
        let payload: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.choices[0].message.content.as_deref(), Some("web"));
    }
}
