use crate::error::*;
use std::time::Duration;
use tracing::{error, info};

/// Classification shared by the retry loop, error replies and startup
/// reporting.
pub trait ErrorExt {
    /// Whether repeating the same call may succeed.
    fn is_retryable(&self) -> bool;
    /// Delay the remote side asked for before the next attempt.
    fn retry_after(&self) -> Option<Duration>;
    /// Short text that can be shown to whoever triggered the failure.
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> &'static str;
}

impl ErrorExt for CoreError {
    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => match e {
                RedditApiError::RateLimitExceeded { .. } | RedditApiError::RequestTimeout => true,
                RedditApiError::ServerError { status_code } => *status_code >= 500,
                _ => false,
            },
            CoreError::Llm(e) => matches!(
                e,
                LlmError::RateLimitExceeded { .. }
                    | LlmError::ServiceUnavailable { .. }
                    | LlmError::RequestTimeout { .. }
            ),
            CoreError::Network(e) => e.is_timeout() || e.is_connect(),
            CoreError::Config(_)
            | CoreError::Internal { .. }
            | CoreError::SafetyShutdown
            | CoreError::NotRunning { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after })
            | CoreError::Llm(LlmError::RateLimitExceeded { retry_after, .. }) => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after }) => format!(
                "Reddit is rate limiting me right now, I'll be back in about {} seconds.",
                retry_after
            ),
            CoreError::RedditApi(_) | CoreError::Network(_) => {
                "I couldn't reach Reddit just now. Please try again later.".to_string()
            }
            CoreError::Llm(LlmError::ContentFiltered { .. }) => {
                "Sorry, that's not something I can help with.".to_string()
            }
            CoreError::Llm(_) => {
                "Sorry, I couldn't put an answer together right now. Please try again later."
                    .to_string()
            }
            CoreError::Config(ConfigError::MissingEnvironmentVariable { var_name }) => {
                format!("Environment variable '{}' is required but not set.", var_name)
            }
            CoreError::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            CoreError::Config(e) => format!("Invalid configuration: {}", e),
            CoreError::SafetyShutdown => {
                "I'm paused after repeated problems and will be back once an operator checks in."
                    .to_string()
            }
            CoreError::Internal { .. } | CoreError::NotRunning { .. } => {
                "Something went wrong on my end. Please try again later.".to_string()
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            CoreError::RedditApi(_) => "REDDIT_API",
            CoreError::Llm(_) => "LLM",
            CoreError::Config(_) => "CONFIG",
            CoreError::Network(_) => "NETWORK",
            CoreError::Internal { .. } => "INTERNAL",
            CoreError::SafetyShutdown => "SAFETY_SHUTDOWN",
            CoreError::NotRunning { .. } => "NOT_RUNNING",
        }
    }
}

/// Logs errors that end the process.
pub struct ErrorReporter {
    component: String,
}

impl ErrorReporter {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn report_error(&self, error: &CoreError) {
        error!("[{}] {} ({})", self.component, error, error.error_code());
        info!("{}", error.user_friendly_message());
    }
}
