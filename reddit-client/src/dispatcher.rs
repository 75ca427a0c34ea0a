use crate::limits::{InteractionTracker, LimitViolation};
use crate::poller::ItemSink;
use crate::policy::{PolicyViolation, SubredditPolicies};
use crate::retry::RetryExecutor;
use crate::safety::SafetyBreaker;
use crate::service::RedditApi;
use agentlink_core::{
    string_to_uuid, AgentRuntime, CommentOrigin, Content, CoreError, ErrorExt, LlmError, Memory,
    RedditItem, ResponseDecision, State,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SOURCE: &str = "reddit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Shutdown,
    Empty,
    OwnItem,
    BlockedUser,
    BlockedPost,
    Policy(PolicyViolation),
    Limit(LimitViolation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Replied { thing_id: String, comment_id: String },
    Skipped(SkipReason),
    /// The runtime chose not to answer.
    Declined,
    Failed,
}

/// What a mention gets when no response could be generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorReply {
    Silent,
    Fixed(String),
    /// A short description of the failure
    Explain,
}

/// Turns new items into replies: policy, limits, runtime decision,
/// generation and submission.
pub struct ActionDispatcher {
    runtime: Arc<dyn AgentRuntime>,
    api: Arc<dyn RedditApi>,
    safety: Arc<SafetyBreaker>,
    policies: SubredditPolicies,
    limits: InteractionTracker,
    retry: RetryExecutor,
    bot_username: String,
    error_reply: ErrorReply,
}

impl ActionDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        api: Arc<dyn RedditApi>,
        safety: Arc<SafetyBreaker>,
        policies: SubredditPolicies,
        limits: InteractionTracker,
        retry: RetryExecutor,
        bot_username: String,
        error_reply: ErrorReply,
    ) -> Self {
        Self {
            runtime,
            api,
            safety,
            policies,
            limits,
            retry,
            bot_username,
            error_reply,
        }
    }

    pub fn policies(&self) -> &SubredditPolicies {
        &self.policies
    }

    pub fn policies_mut(&mut self) -> &mut SubredditPolicies {
        &mut self.policies
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    pub async fn dispatch(&mut self, item: RedditItem) -> DispatchOutcome {
        let thread_id = item.thread_id();

        if let Err(reason) = self.screen(&item, &thread_id) {
            debug!("Skipping {} {}: {:?}", item.kind_label(), item.id(), reason);
            return DispatchOutcome::Skipped(reason);
        }

        if let Err(violation) = self.check_policy(&item).await {
            return match violation {
                Ok(violation) => {
                    if matches!(
                        violation,
                        PolicyViolation::ForbiddenTopic { .. } | PolicyViolation::NoAllowedTopic
                    ) {
                        self.safety.record_topic_violation(item.subreddit());
                    }
                    debug!(
                        "r/{} policy rejected {} {}: {}",
                        item.subreddit(),
                        item.kind_label(),
                        item.id(),
                        violation
                    );
                    DispatchOutcome::Skipped(SkipReason::Policy(violation))
                }
                Err(e) => {
                    warn!("Could not check author of {}: {}", item.id(), e);
                    self.safety.record_error("author lookup");
                    DispatchOutcome::Failed
                }
            };
        }

        if let Err(limit) = self.limits.check(&thread_id) {
            debug!("Not replying to {}: {}", item.id(), limit);
            return DispatchOutcome::Skipped(SkipReason::Limit(limit));
        }

        let state = match self.prepare_state(&item).await {
            Ok(state) => state,
            Err(e) => {
                self.runtime_failure(&e, "compose state");
                return DispatchOutcome::Failed;
            }
        };

        match self.runtime.should_respond(&state).await {
            Ok(ResponseDecision::Respond) => {}
            Ok(ResponseDecision::Ignore) => {
                debug!("Runtime ignored {} {}", item.kind_label(), item.id());
                return DispatchOutcome::Declined;
            }
            Ok(ResponseDecision::Stop) => {
                info!("Runtime asked to stop engaging in thread {}", thread_id);
                self.safety.block_post(&thread_id);
                return DispatchOutcome::Declined;
            }
            Err(e) => {
                self.runtime_failure(&e, "should respond");
                return DispatchOutcome::Failed;
            }
        }

        let response = match self.runtime.generate_response(&state).await {
            Ok(content) if content.text.trim().is_empty() => {
                debug!("Runtime produced an empty reply for {}", item.id());
                return DispatchOutcome::Declined;
            }
            Ok(content) => content,
            Err(e) => {
                self.runtime_failure(&e, "generate response");
                if is_mention(&item) {
                    let reply = match &self.error_reply {
                        ErrorReply::Silent => None,
                        ErrorReply::Fixed(text) => Some(text.clone()),
                        ErrorReply::Explain => Some(e.user_friendly_message()),
                    };
                    if let Some(reply) = reply {
                        self.submit(&item, &thread_id, &reply).await;
                    }
                }
                return DispatchOutcome::Failed;
            }
        };

        self.submit(&item, &thread_id, response.text.trim()).await
    }

    /// Cheap checks that need neither the runtime nor the network.
    fn screen(&self, item: &RedditItem, thread_id: &str) -> Result<(), SkipReason> {
        if self.safety.is_shutdown() {
            return Err(SkipReason::Shutdown);
        }
        if item.text().trim().is_empty() || item.author() == "[deleted]" {
            return Err(SkipReason::Empty);
        }
        if item.author().eq_ignore_ascii_case(&self.bot_username) {
            return Err(SkipReason::OwnItem);
        }
        if self.safety.is_user_blocked(item.author()) {
            return Err(SkipReason::BlockedUser);
        }
        if self.safety.is_post_blocked(thread_id) {
            return Err(SkipReason::BlockedPost);
        }
        Ok(())
    }

    /// `Err(Ok(_))` is a violation, `Err(Err(_))` a failed author lookup.
    async fn check_policy(
        &self,
        item: &RedditItem,
    ) -> Result<(), Result<PolicyViolation, CoreError>> {
        self.policies.check_content(item).map_err(Ok)?;

        if self.policies.get(item.subreddit()).needs_author_profile() {
            let author = self.api.user_about(item.author()).await.map_err(Err)?;
            self.policies
                .check_author(item.subreddit(), &author, Utc::now())
                .map_err(Ok)?;
        }
        Ok(())
    }

    async fn prepare_state(&self, item: &RedditItem) -> Result<State, CoreError> {
        let memory = self.memory_for(item);
        self.runtime.create_memory(memory.clone()).await?;
        let mut state = self.runtime.compose_state(&memory).await?;

        let config = self.policies.get(item.subreddit());
        state.set("platform", SOURCE);
        state.set("agentName", self.bot_username.clone());
        state.set("subreddit", item.subreddit());
        state.set("author", item.author());
        state.set("itemKind", item.kind_label());
        state.set("itemText", item.text());
        state.set("allowedTopics", config.allowed_topics.join(", "));
        state.set("forbiddenTopics", config.forbidden_topics.join(", "));
        state.set("customRules", config.custom_rules.join("\n"));
        Ok(state)
    }

    fn memory_for(&self, item: &RedditItem) -> Memory {
        let agent_id = self.runtime.agent_id();
        let mut metadata = HashMap::new();
        metadata.insert("thing_id".to_string(), item.fullname());
        metadata.insert("subreddit".to_string(), item.subreddit().to_string());
        metadata.insert("kind".to_string(), item.kind_label().to_string());
        metadata.insert("author".to_string(), item.author().to_string());

        Memory {
            id: string_to_uuid(&format!("{}-{}", item.fullname(), agent_id)),
            user_id: string_to_uuid(item.author()),
            agent_id,
            room_id: string_to_uuid(&format!("reddit-{}", item.thread_id())),
            content: Content {
                text: item.text(),
                source: SOURCE.to_string(),
                action: None,
                metadata,
            },
            created_at: item.created_utc() * 1000,
        }
    }

    async fn submit(&mut self, item: &RedditItem, thread_id: &str, text: &str) -> DispatchOutcome {
        if self.safety.is_shutdown() {
            debug!("Shutdown before reply to {}, dropping it", item.id());
            return DispatchOutcome::Skipped(SkipReason::Shutdown);
        }

        let thing_id = item.fullname();
        let api = self.api.clone();
        let safety = self.safety.clone();
        let result = self
            .retry
            .execute("submit_reply", || {
                let api = api.clone();
                let safety = safety.clone();
                let thing_id = thing_id.clone();
                async move {
                    if safety.is_shutdown() {
                        return Err(CoreError::SafetyShutdown);
                    }
                    api.reply(&thing_id, text).await
                }
            })
            .await;

        match result {
            Ok(comment_id) => {
                self.limits.record_comment(thread_id);
                info!(
                    "Replied to {} {} in r/{} (comment {})",
                    item.kind_label(),
                    item.id(),
                    item.subreddit(),
                    comment_id
                );
                self.remember_reply(item, &comment_id, text).await;
                DispatchOutcome::Replied {
                    thing_id,
                    comment_id,
                }
            }
            Err(CoreError::SafetyShutdown) => {
                debug!("Shutdown while replying to {}, dropping it", item.id());
                DispatchOutcome::Skipped(SkipReason::Shutdown)
            }
            Err(_) => {
                self.safety.record_warning("reply submission");
                self.safety.block_post(thread_id);
                DispatchOutcome::Failed
            }
        }
    }

    async fn remember_reply(&self, item: &RedditItem, comment_id: &str, text: &str) {
        let agent_id = self.runtime.agent_id();
        let mut metadata = HashMap::new();
        metadata.insert("thing_id".to_string(), format!("t1_{}", comment_id));
        metadata.insert("in_reply_to".to_string(), item.fullname());

        let memory = Memory {
            id: string_to_uuid(&format!("t1_{}-{}", comment_id, agent_id)),
            user_id: agent_id,
            agent_id,
            room_id: string_to_uuid(&format!("reddit-{}", item.thread_id())),
            content: Content {
                text: text.to_string(),
                source: SOURCE.to_string(),
                action: None,
                metadata,
            },
            created_at: Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.runtime.create_memory(memory).await {
            warn!("Failed to store reply memory: {}", e);
        }
    }

    fn runtime_failure(&self, error: &CoreError, stage: &str) {
        match error {
            CoreError::Llm(LlmError::ContentFiltered { reason }) => {
                self.safety
                    .record_fatal(&format!("{}: content filtered ({})", stage, reason));
            }
            _ => {
                warn!("Runtime failed during {}: {}", stage, error);
                self.safety.record_warning(stage);
            }
        }
    }
}

fn is_mention(item: &RedditItem) -> bool {
    matches!(item, RedditItem::Comment(c) if c.origin != CommentOrigin::Thread)
}

#[async_trait]
impl ItemSink for ActionDispatcher {
    async fn handle(&mut self, item: RedditItem) -> DispatchOutcome {
        self.dispatch(item).await
    }
}
