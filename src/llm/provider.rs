// src/llm/provider.rs
// OpenAI-compatible chat-completions client with structured JSON output.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::LlmConfig;
use crate::error::{Result, ServiceError};
use crate::session::ChatMessage;

/// Shared LLM client. One instance serves every call site; each call site
/// owns its deterministic fallback for the unavailable/failed cases.
#[derive(Clone)]
pub struct ChatProvider {
    client: Client,
    config: LlmConfig,
}

impl ChatProvider {
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    /// Plain-text completion with the semantic-parser model.
    pub async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
        self.call(&self.config.semantic_parser_model, system, messages, false, None)
            .await
    }

    /// JSON-mode completion parsed into a declared schema type. The model
    /// must emit one JSON object conforming to `T`; anything else is an
    /// `LlmFailure` the caller converts into its fallback path.
    pub async fn complete_structured<T: DeserializeOwned>(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<T> {
        let raw = self
            .call(&self.config.semantic_parser_model, system, messages, true, None)
            .await?;
        serde_json::from_str(&raw)
            .map_err(|e| ServiceError::LlmFailure(format!("schema parse failed: {e}: {raw}")))
    }

    /// Structured completion with the (typically larger) question-generator
    /// model and a non-zero temperature for phrasing variety.
    pub async fn complete_structured_creative<T: DeserializeOwned>(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<T> {
        let raw = self
            .call(
                &self.config.question_generator_model,
                system,
                messages,
                true,
                Some(0.7),
            )
            .await?;
        serde_json::from_str(&raw)
            .map_err(|e| ServiceError::LlmFailure(format!("schema parse failed: {e}: {raw}")))
    }

    async fn call(
        &self,
        model: &str,
        system: &str,
        messages: &[ChatMessage],
        json_mode: bool,
        temperature: Option<f32>,
    ) -> Result<String> {
        if !self.is_available() {
            return Err(ServiceError::LlmFailure("no API key configured".into()));
        }

        let mut api_messages = vec![json!({"role": "system", "content": system})];
        for message in messages {
            api_messages.push(json!({"role": message.role, "content": message.content}));
        }

        let mut body = json!({
            "model": model,
            "messages": api_messages,
            "temperature": temperature.unwrap_or(self.config.temperature),
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        debug!("LLM call: model={}, {} messages", model, messages.len());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::LlmFailure("request timed out".into())
                } else {
                    ServiceError::Http(e)
                }
            })?;

        if response.status().as_u16() == 429 {
            return Err(ServiceError::RateLimited);
        }
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("LLM API error {}: {}", status, error_text);
            return Err(ServiceError::LlmFailure(format!("API error {status}")));
        }

        let raw: Value = response.json().await?;
        let content = raw
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| ServiceError::LlmFailure("malformed completion response".into()))?;

        let tokens_in = raw["usage"]["prompt_tokens"].as_i64().unwrap_or(0);
        let tokens_out = raw["usage"]["completion_tokens"].as_i64().unwrap_or(0);
        info!(
            "LLM completion: model={}, tokens_in={}, tokens_out={}",
            model, tokens_in, tokens_out
        );

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::schemas::ExtractedCriteria;

    fn offline_provider() -> ChatProvider {
        ChatProvider::new(LlmConfig {
            api_key: String::new(),
            base_url: "http://localhost:0".into(),
            semantic_parser_model: "gpt-4o-mini".into(),
            question_generator_model: "gpt-4o".into(),
            temperature: 0.0,
            timeout_secs: 1,
        })
    }

    #[tokio::test]
    async fn test_unavailable_provider_reports_llm_failure() {
        let provider = offline_provider();
        assert!(!provider.is_available());
        let err = provider
            .complete_structured::<ExtractedCriteria>("system", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::LlmFailure(_)));
    }
}
