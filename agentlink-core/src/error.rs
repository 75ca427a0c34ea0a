use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Reddit API error: {0}")]
    RedditApi(#[from] RedditApiError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Outbound actions disabled by safety shutdown")]
    SafetyShutdown,

    #[error("Client {client} is not running")]
    NotRunning { client: String },
}

#[derive(Error, Debug, Clone)]
pub enum RedditApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Subreddit not found: {subreddit}")]
    SubredditNotFound { subreddit: String },

    #[error("Thing not found: {thing_id}")]
    ThingNotFound { thing_id: String },

    #[error("Invalid OAuth token")]
    InvalidToken,

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Comment rejected: {reason}")]
    CommentRejected { reason: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API key invalid or missing for {provider}")]
    InvalidApiKey { provider: String },

    #[error("Rate limit exceeded for {provider}. Retry after {retry_after} seconds")]
    RateLimitExceeded { provider: String, retry_after: u64 },

    #[error("Model not available: {model}")]
    ModelNotAvailable { model: String },

    #[error("Content filtered by provider: {reason}")]
    ContentFiltered { reason: String },

    #[error("Provider service unavailable: {provider}")]
    ServiceUnavailable { provider: String },

    #[error("Request timeout for {provider}")]
    RequestTimeout { provider: String },

    #[error("Invalid response format from {provider}")]
    InvalidResponseFormat { provider: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
