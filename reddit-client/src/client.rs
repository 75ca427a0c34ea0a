use crate::config::RedditClientConfig;
use crate::dispatcher::ActionDispatcher;
use crate::environment::RedditEnv;
use crate::limits::InteractionTracker;
use crate::poller::{EventPoller, PollReport};
use crate::policy::SubredditConfig;
use crate::retry::RetryExecutor;
use crate::safety::{SafetyBreaker, SafetyState};
use crate::service::{RedditApi, RedditService};
use agentlink_core::{AgentRuntime, Client, ClientHandle, CoreError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub const CLIENT_NAME: &str = "reddit";

/// State owned by one running client.
struct RedditSession {
    api: Arc<dyn RedditApi>,
    safety: Arc<SafetyBreaker>,
    poller: EventPoller,
    dispatcher: ActionDispatcher,
    stop: watch::Receiver<bool>,
}

impl RedditSession {
    async fn run_cycle(&mut self) -> PollReport {
        self.poller
            .run_cycle(&*self.api, &self.safety, &mut self.dispatcher, &self.stop)
            .await
    }

    async fn check_for_events(&mut self) -> Option<PollReport> {
        self.poller
            .check_for_events(&*self.api, &self.safety, &mut self.dispatcher, &self.stop)
            .await
    }
}

/// Reddit adapter: one poller and one dispatcher per instance, driven by a
/// single timer task.
pub struct RedditClient {
    config: RedditClientConfig,
    api: Option<Arc<dyn RedditApi>>,
    safety: Arc<SafetyBreaker>,
    session: Arc<Mutex<Option<RedditSession>>>,
}

impl RedditClient {
    pub fn new(config: RedditClientConfig) -> Self {
        let safety = Arc::new(SafetyBreaker::new(config.safety.clone()));
        Self {
            config,
            api: None,
            safety,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Uses `api` instead of building a live [`RedditService`] on start.
    pub fn with_api(config: RedditClientConfig, api: Arc<dyn RedditApi>) -> Self {
        Self {
            api: Some(api),
            ..Self::new(config)
        }
    }

    pub fn safety_state(&self) -> SafetyState {
        self.safety.state()
    }

    pub fn reset_safety(&self) {
        self.safety.reset();
    }

    pub async fn is_running(&self) -> bool {
        live(&mut *self.session.lock().await).is_some()
    }

    /// Adds or replaces the rules for one subreddit and starts watching it.
    pub async fn reconfigure_subreddit(&self, config: SubredditConfig) -> Result<(), CoreError> {
        let mut guard = self.session.lock().await;
        let session = live(&mut guard).ok_or_else(|| CoreError::NotRunning {
            client: CLIENT_NAME.to_string(),
        })?;

        let name = config.name.clone();
        if let Err(e) = session.dispatcher.policies_mut().configure(config) {
            error!("Failed to configure r/{}: {}", name, e);
            self.safety.record_error("subreddit configuration");
            return Err(e.into());
        }
        session.poller.add_subreddit(&name);
        Ok(())
    }

    /// Runs a cycle now unless one ran within the last interval.
    pub async fn check_for_events(&self) -> Result<Option<PollReport>, CoreError> {
        let mut guard = self.session.lock().await;
        let session = live(&mut guard).ok_or_else(|| CoreError::NotRunning {
            client: CLIENT_NAME.to_string(),
        })?;
        Ok(session.check_for_events().await)
    }
}

#[async_trait]
impl Client for RedditClient {
    fn name(&self) -> &str {
        CLIENT_NAME
    }

    async fn start(&self, runtime: Arc<dyn AgentRuntime>) -> Result<ClientHandle, CoreError> {
        let env = RedditEnv::from_settings(&*runtime)?;

        let mut config = self.config.clone();
        config.apply_env(&env);
        config.validate()?;

        let api: Arc<dyn RedditApi> = match &self.api {
            Some(api) => api.clone(),
            None => Arc::new(RedditService::new(&env)?),
        };

        let me = api.current_user().await?;
        info!("Reddit client authenticated as u/{}", me.name);

        let (shutdown, stop) = watch::channel(false);
        let dispatcher = ActionDispatcher::new(
            runtime,
            api.clone(),
            self.safety.clone(),
            config.policies()?,
            InteractionTracker::new(config.limits.clone()),
            RetryExecutor::new(config.retry.clone()),
            me.name,
            config.error_reply_mode(),
        );
        let poller = EventPoller::new(
            config.poller.clone(),
            &config.dedup,
            config.subreddit_names(),
        );
        info!(
            "Watching {:?} every {:?}",
            poller.subreddits(),
            poller.config().interval()
        );

        *self.session.lock().await = Some(RedditSession {
            api,
            safety: self.safety.clone(),
            poller,
            dispatcher,
            stop: stop.clone(),
        });

        let task = tokio::spawn(run_loop(
            self.session.clone(),
            self.safety.clone(),
            config.poller.interval(),
            stop,
        ));
        Ok(ClientHandle::new(CLIENT_NAME, shutdown, task))
    }
}

/// A session whose loop was told to stop is gone, even when the loop was
/// aborted before it could clear the slot.
fn live(slot: &mut Option<RedditSession>) -> Option<&mut RedditSession> {
    if matches!(slot, Some(session) if *session.stop.borrow()) {
        *slot = None;
    }
    slot.as_mut()
}

async fn run_loop(
    session: Arc<Mutex<Option<RedditSession>>>,
    safety: Arc<SafetyBreaker>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if safety.state() == SafetyState::Shutdown {
                    debug!("Safety shutdown active, not polling");
                    continue;
                }
                let Ok(mut guard) = session.try_lock() else {
                    debug!("Previous cycle still running, skipping tick");
                    continue;
                };
                if let Some(session) = guard.as_mut() {
                    session.run_cycle().await;
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
        if *stop.borrow() {
            break;
        }
    }

    *session.lock().await = None;
    info!("Reddit client stopped");
}
