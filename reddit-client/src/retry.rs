use agentlink_core::{CoreError, ErrorExt};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Configuration for retry behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Upper bound for a server-provided retry-after (in seconds)
    pub max_retry_after_s: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 60000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            max_retry_after_s: 120,
        }
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after the delay the server asked for
    RetryWithDelay(Duration),
    /// Don't retry (permanent failures)
    NoRetry,
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    if !error.is_retryable() {
        return RetryStrategy::NoRetry;
    }
    match error.retry_after() {
        Some(delay) => RetryStrategy::RetryWithDelay(delay),
        None => RetryStrategy::Retry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let multiplier = config.backoff_multiplier.powi(attempt as i32);
    let delay_ms = (config.base_delay_ms as f64 * multiplier).min(config.max_delay_ms as f64);
    let exponential_delay = Duration::from_millis(delay_ms as u64);

    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);

    (exponential_delay + Duration::from_millis(jitter)).min(max_delay)
}

#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub exhausted_operations: u64,
    pub permanent_failures: u64,
}

/// Wraps vendor calls with bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    metrics: Arc<Mutex<RetryMetrics>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(Mutex::new(RetryMetrics::default())),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` at most `max_attempts` times. The final failure is
    /// logged here once and returned unchanged to the caller.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            let start_time = Instant::now();
            let error = match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        if let Ok(mut metrics) = self.metrics.lock() {
                            metrics.total_retries += attempt as u64;
                            metrics.successful_retries += 1;
                        }
                        info!(
                            "Operation {} succeeded after {} retries",
                            operation_name, attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            attempt += 1;
            debug!(
                "Attempt {}/{} failed for {} after {:?}: {}",
                attempt,
                max_attempts,
                operation_name,
                start_time.elapsed(),
                error
            );

            let delay = match get_retry_strategy(&error) {
                RetryStrategy::NoRetry => {
                    if let Ok(mut metrics) = self.metrics.lock() {
                        metrics.total_retries += (attempt - 1) as u64;
                        metrics.permanent_failures += 1;
                    }
                    error!(
                        "Operation {} failed with a non-retryable error: {}",
                        operation_name, error
                    );
                    return Err(error);
                }
                _ if attempt >= max_attempts => {
                    if let Ok(mut metrics) = self.metrics.lock() {
                        metrics.total_retries += (attempt - 1) as u64;
                        metrics.exhausted_operations += 1;
                    }
                    error!(
                        "Operation {} failed after {} attempts: {}",
                        operation_name, attempt, error
                    );
                    return Err(error);
                }
                RetryStrategy::Retry => calculate_delay(attempt - 1, &self.config),
                RetryStrategy::RetryWithDelay(delay) => {
                    delay.min(Duration::from_secs(self.config.max_retry_after_s))
                }
            };

            info!(
                "Retrying {} in {:?} (attempt {}/{}) due to: {}",
                operation_name, delay, attempt, max_attempts, error
            );
            sleep(delay).await;
        }
    }

    pub fn get_metrics(&self) -> RetryMetrics {
        self.metrics
            .lock()
            .map(|metrics| metrics.clone())
            .unwrap_or_default()
    }
}
