use agent_host::HostConfig;
use agentlink_core::{CoreError, ErrorReporter};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "agentlink=info,agent_host=info,reddit_client=info,llm_interface=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    tracing::info!("Starting agentlink {}", env!("CARGO_PKG_VERSION"));

    let reporter = ErrorReporter::new("agentlink");
    let config = HostConfig::from_env().map_err(|e| {
        let e = CoreError::from(e);
        reporter.report_error(&e);
        e
    })?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    if let Err(e) = agent_host::run(config, shutdown).await {
        reporter.report_error(&e);
        return Err(e.into());
    }

    tracing::info!("agentlink stopped");
    Ok(())
}
