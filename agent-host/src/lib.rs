//! Hosts platform clients in-process: a local [`AgentRuntime`] backed by an
//! LLM provider, and an [`Orchestrator`] that owns client lifecycles.
//!
//! [`AgentRuntime`]: agentlink_core::AgentRuntime

pub mod config;
pub mod orchestrator;
pub mod runtime;
pub mod templates;

pub use config::{CharacterConfig, HostConfig};
pub use orchestrator::Orchestrator;
pub use runtime::LocalRuntime;

use agentlink_core::settings::{require, EnvSettings};
use agentlink_core::CoreError;
use reddit_client::RedditClient;
use std::future::Future;
use std::sync::Arc;

/// Builds the runtime and clients described by `config` and runs them until
/// `shutdown` resolves.
pub async fn run<F>(config: HostConfig, shutdown: F) -> Result<(), CoreError>
where
    F: Future<Output = ()>,
{
    let api_key = match config.settings.get(config.llm.api_key_var()) {
        Some(key) if !key.trim().is_empty() => key.trim().to_string(),
        _ => require(&EnvSettings, config.llm.api_key_var())?,
    };
    let provider = llm_interface::build_provider(&config.llm, api_key)?;
    let runtime = Arc::new(LocalRuntime::new(&config, provider));

    Orchestrator::new(runtime)
        .with_client(Box::new(RedditClient::new(config.reddit.clone())))
        .run_until(shutdown)
        .await
}
