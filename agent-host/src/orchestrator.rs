use agentlink_core::{AgentRuntime, Client, ClientHandle, CoreError};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Starts platform clients against one runtime and stops them together.
pub struct Orchestrator {
    runtime: Arc<dyn AgentRuntime>,
    clients: Vec<Box<dyn Client>>,
    handles: Vec<ClientHandle>,
}

impl Orchestrator {
    pub fn new(runtime: Arc<dyn AgentRuntime>) -> Self {
        Self {
            runtime,
            clients: Vec::new(),
            handles: Vec::new(),
        }
    }

    pub fn with_client(mut self, client: Box<dyn Client>) -> Self {
        self.clients.push(client);
        self
    }

    pub fn running(&self) -> Vec<&str> {
        self.handles.iter().map(|h| h.name()).collect()
    }

    /// Starts every registered client. If one fails, the ones already
    /// running are stopped and the error is returned.
    pub async fn start_all(&mut self) -> Result<(), CoreError> {
        for index in 0..self.clients.len() {
            let client = &self.clients[index];
            info!("Starting client {}", client.name());
            match client.start(self.runtime.clone()).await {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    error!("Client {} failed to start: {}", client.name(), e);
                    self.stop_all().await;
                    return Err(e);
                }
            }
        }
        info!("{} client(s) running", self.handles.len());
        Ok(())
    }

    pub async fn stop_all(&mut self) {
        join_all(self.handles.drain(..).map(ClientHandle::stop)).await;
    }

    /// Runs until `shutdown` resolves, then stops all clients.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), CoreError>
    where
        F: Future<Output = ()>,
    {
        self.start_all().await?;
        shutdown.await;
        info!("Shutdown requested");
        self.stop_all().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlink_core::{Content, ConfigError, Memory, ResponseDecision, State};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::watch;
    use uuid::Uuid;

    struct NullRuntime;

    #[async_trait]
    impl AgentRuntime for NullRuntime {
        fn agent_id(&self) -> Uuid {
            Uuid::nil()
        }

        fn get_setting(&self, _key: &str) -> Option<String> {
            None
        }

        async fn create_memory(&self, _memory: Memory) -> Result<(), CoreError> {
            Ok(())
        }

        async fn compose_state(&self, _memory: &Memory) -> Result<State, CoreError> {
            Ok(State::default())
        }

        async fn should_respond(&self, _state: &State) -> Result<ResponseDecision, CoreError> {
            Ok(ResponseDecision::Ignore)
        }

        async fn generate_response(&self, _state: &State) -> Result<Content, CoreError> {
            Ok(Content::default())
        }
    }

    struct TestClient {
        name: String,
        fail: bool,
        started: Arc<AtomicUsize>,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Client for TestClient {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&self, _runtime: Arc<dyn AgentRuntime>) -> Result<ClientHandle, CoreError> {
            if self.fail {
                return Err(ConfigError::MissingEnvironmentVariable {
                    var_name: "TOKEN".to_string(),
                }
                .into());
            }
            self.started.fetch_add(1, Ordering::SeqCst);

            let (tx, mut rx) = watch::channel(false);
            let stopped = self.stopped.clone();
            let task = tokio::spawn(async move {
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
                stopped.store(true, Ordering::SeqCst);
            });
            Ok(ClientHandle::new(self.name.clone(), tx, task))
        }
    }

    fn client(name: &str, fail: bool) -> (Box<dyn Client>, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let started = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicBool::new(false));
        let client = TestClient {
            name: name.to_string(),
            fail,
            started: started.clone(),
            stopped: stopped.clone(),
        };
        (Box::new(client), started, stopped)
    }

    #[tokio::test]
    async fn test_run_until_starts_and_stops_clients() {
        let (reddit, started, stopped) = client("reddit", false);
        let orchestrator = Orchestrator::new(Arc::new(NullRuntime)).with_client(reddit);

        tokio_test::assert_ok!(orchestrator.run_until(async {}).await);
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_start_stops_running_clients() {
        let (first, _, first_stopped) = client("first", false);
        let (broken, _, _) = client("broken", true);
        let mut orchestrator = Orchestrator::new(Arc::new(NullRuntime))
            .with_client(first)
            .with_client(broken);

        let error = tokio_test::assert_err!(orchestrator.start_all().await);
        assert!(matches!(
            error,
            CoreError::Config(ConfigError::MissingEnvironmentVariable { .. })
        ));
        assert!(first_stopped.load(Ordering::SeqCst));
        assert!(orchestrator.running().is_empty());
    }
}
