//! Text generation backends used by the agent host.

mod claude;
mod openai;

pub use claude::ClaudeProvider;
pub use openai::OpenAiProvider;

use agentlink_core::{CoreError, LlmError};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    #[serde(alias = "claude")]
    Anthropic,
}

impl std::str::FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(LlmError::ModelNotAvailable {
                model: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: Option<String>,
    /// Alternative endpoint for OpenAI-compatible servers
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: None,
            base_url: None,
            max_tokens: 512,
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn request(&self, system: Option<String>, prompt: String) -> CompletionRequest {
        CompletionRequest {
            system,
            prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Environment variable holding the key for the configured provider.
    pub fn api_key_var(&self) -> &'static str {
        match self.provider {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

pub fn build_provider(config: &LlmConfig, api_key: String) -> Result<Arc<dyn LlmProvider>, CoreError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let provider: Arc<dyn LlmProvider> = match config.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            timeout,
        )?),
        ProviderKind::Anthropic => Arc::new(ClaudeProvider::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            timeout,
        )?),
    };
    Ok(provider)
}

/// Maps a non-success HTTP status from a provider to an [`LlmError`].
pub(crate) fn status_error(provider: &str, model: &str, response: &Response) -> LlmError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::InvalidApiKey {
            provider: provider.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimitExceeded {
            provider: provider.to_string(),
            retry_after: response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(30),
        },
        StatusCode::NOT_FOUND => LlmError::ModelNotAvailable {
            model: model.to_string(),
        },
        _ => LlmError::ServiceUnavailable {
            provider: format!("{} ({})", provider, status.as_u16()),
        },
    }
}

pub(crate) fn transport_error(provider: &str, error: reqwest::Error) -> CoreError {
    if error.is_timeout() {
        CoreError::Llm(LlmError::RequestTimeout {
            provider: provider.to_string(),
        })
    } else if error.is_connect() {
        CoreError::Llm(LlmError::ServiceUnavailable {
            provider: provider.to_string(),
        })
    } else {
        CoreError::Network(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert!("llama".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_llm_config_from_toml() {
        let config: LlmConfig = toml::from_str(
            r#"
            provider = "anthropic"
            model = "claude-3-5-haiku-latest"
            max_tokens = 300
            "#,
        )
        .unwrap();

        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.max_tokens, 300);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.api_key_var(), "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_build_provider_uses_default_models() {
        let openai = build_provider(&LlmConfig::default(), "key".to_string()).unwrap();
        assert_eq!(openai.name(), "openai");
        assert!(!openai.model().is_empty());

        let config = LlmConfig {
            provider: ProviderKind::Anthropic,
            model: Some("claude-custom".to_string()),
            ..Default::default()
        };
        let claude = build_provider(&config, "key".to_string()).unwrap();
        assert_eq!(claude.name(), "anthropic");
        assert_eq!(claude.model(), "claude-custom");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_maps_to_llm_error() {
        let config = LlmConfig {
            base_url: Some("http://127.0.0.1:9".to_string()),
            timeout_secs: 2,
            ..Default::default()
        };
        let provider = build_provider(&config, "key".to_string()).unwrap();
        let request = config.request(None, "hello".to_string());

        let error = tokio_test::assert_err!(provider.complete(&request).await);
        assert!(matches!(
            error,
            CoreError::Llm(LlmError::ServiceUnavailable { .. })
                | CoreError::Llm(LlmError::RequestTimeout { .. })
        ));
    }
}
