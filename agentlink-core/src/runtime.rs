//! Contracts between platform clients and the agent runtime that hosts them.
//!
//! The runtime owns model inference, memory storage and state composition.
//! Clients only ever see it through [`AgentRuntime`], and the host only ever
//! sees clients through [`Client`] and the [`ClientHandle`] returned by
//! `start`.

use crate::{CoreError, Memory, ResponseDecision, State};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

#[async_trait]
pub trait AgentRuntime: Send + Sync {
    fn agent_id(&self) -> Uuid;

    /// Looks up a setting by key; empty values count as unset.
    fn get_setting(&self, key: &str) -> Option<String>;

    async fn create_memory(&self, memory: Memory) -> Result<(), CoreError>;

    async fn compose_state(&self, memory: &Memory) -> Result<State, CoreError>;

    async fn should_respond(&self, state: &State) -> Result<ResponseDecision, CoreError>;

    async fn generate_response(&self, state: &State) -> Result<crate::Content, CoreError>;
}

#[async_trait]
pub trait Client: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self, runtime: Arc<dyn AgentRuntime>) -> Result<ClientHandle, CoreError>;
}

/// Running client. Dropping the handle leaves the task running; call
/// [`ClientHandle::stop`] to shut it down.
#[derive(Debug)]
pub struct ClientHandle {
    name: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    grace_period: Duration,
}

impl ClientHandle {
    pub fn new(name: impl Into<String>, shutdown: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            shutdown,
            task,
            grace_period: Duration::from_secs(5),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the client loop to stop and waits up to the grace period.
    /// Work still in flight after that is aborted and its results discarded.
    pub async fn stop(self) {
        info!("Stopping client {}", self.name);
        let _ = self.shutdown.send(true);

        let mut task = self.task;
        match tokio::time::timeout(self.grace_period, &mut task).await {
            Ok(Ok(())) => info!("Client {} stopped", self.name),
            Ok(Err(e)) => warn!("Client {} task ended abnormally: {}", self.name, e),
            Err(_) => {
                warn!(
                    "Client {} did not stop within {:?}, aborting",
                    self.name, self.grace_period
                );
                task.abort();
                let _ = task.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_signals_loop() {
        let (tx, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });

        let handle = ClientHandle::new("test", tx, task);
        assert_eq!(handle.name(), "test");
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_aborts_stuck_task() {
        let (tx, _rx) = watch::channel(false);
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let handle =
            ClientHandle::new("stuck", tx, task).with_grace_period(Duration::from_millis(10));
        tokio_test::assert_ok!(
            tokio::time::timeout(Duration::from_secs(1), handle.stop()).await
        );
    }

    #[tokio::test]
    async fn test_stop_returns_after_aborted_task_is_gone() {
        let (tx, _rx) = watch::channel(false);
        let held = std::sync::Arc::new(());
        let in_task = held.clone();
        let task = tokio::spawn(async move {
            let _held = in_task;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        ClientHandle::new("stuck", tx, task)
            .with_grace_period(Duration::from_millis(10))
            .stop()
            .await;
        assert_eq!(std::sync::Arc::strong_count(&held), 1);
    }
}
