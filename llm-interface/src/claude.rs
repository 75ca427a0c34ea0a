use crate::{status_error, transport_error, CompletionRequest, LlmProvider};
use agentlink_core::{CoreError, LlmError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeProvider {
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
    let mut body = json!({
        "model": model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "messages": [{ "role": "user", "content": request.prompt }],
    });
    if let Some(system) = &request.system {
        body["system"] = json!(system);
    }
    body
}

fn extract_text(response: MessagesResponse) -> Result<String, LlmError> {
    if response.stop_reason.as_deref() == Some("refusal") {
        return Err(LlmError::ContentFiltered {
            reason: "refusal".to_string(),
        });
    }

    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
        });
    }
    Ok(text)
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
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
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request_body(&self.model, request))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(status_error(PROVIDER, &self.model, &response).into());
        }

        let body: MessagesResponse =
            response
                .json()
                .await
                .map_err(|_| LlmError::InvalidResponseFormat {
                    provider: PROVIDER.to_string(),
                })?;
        Ok(extract_text(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_is_top_level() {
        let request = CompletionRequest {
            system: Some("Be brief.".to_string()),
            prompt: "Explain lifetimes".to_string(),
            max_tokens: 100,
            temperature: 0.2,
        };
        let body = request_body("claude-test", &request);

        assert_eq!(body["system"], "Be brief.");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_text_blocks_are_joined() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "Hello " },
                { "type": "tool_use", "id": "x" },
                { "type": "text", "text": "there" }
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Hello there");
    }

    #[test]
    fn test_refusal_is_content_filtered() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [],
            "stop_reason": "refusal"
        }))
        .unwrap();
        assert!(matches!(
            extract_text(response),
            Err(LlmError::ContentFiltered { .. })
        ));
    }
}
