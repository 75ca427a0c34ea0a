use crate::{status_error, transport_error, CompletionRequest, LlmProvider};
use agentlink_core::{CoreError, LlmError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions against OpenAI or any compatible server.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

fn request_body(model: &str, request: &CompletionRequest) -> serde_json::Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": request.prompt }));

    json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    })
}

fn extract_text(response: ChatResponse) -> Result<String, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
        })?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(LlmError::ContentFiltered {
            reason: "content_filter".to_string(),
        });
    }

    choice
        .message
        .content
        .ok_or_else(|| LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
        })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CoreError> {
        debug!("Requesting completion from {} ({})", PROVIDER, self.model);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body(&self.model, request))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(status_error(PROVIDER, &self.model, &response).into());
        }

        let body: ChatResponse = response.json().await.map_err(|_| LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
        })?;
        Ok(extract_text(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_includes_system_prompt() {
        let request = CompletionRequest {
            system: Some("You are helpful.".to_string()),
            prompt: "Hi".to_string(),
            max_tokens: 64,
            temperature: 0.5,
        };
        let body = request_body("gpt-test", &request);

        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hi");
        assert_eq!(body["max_tokens"], 64);
    }

    #[test]
    fn test_extract_text() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": "Hello!" }, "finish_reason": "stop" }]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Hello!");
    }

    #[test]
    fn test_content_filter_is_reported() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": null }, "finish_reason": "content_filter" }]
        }))
        .unwrap();
        assert!(matches!(
            extract_text(response),
            Err(LlmError::ContentFiltered { .. })
        ));
    }

    #[test]
    fn test_empty_choices_are_invalid() {
        let response: ChatResponse = serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(matches!(
            extract_text(response),
            Err(LlmError::InvalidResponseFormat { .. })
        ));
    }
}
