use crate::dedup::DedupConfig;
use crate::dispatcher::ErrorReply;
use crate::environment::RedditEnv;
use crate::limits::InteractionLimits;
use crate::poller::PollerConfig;
use crate::policy::{SubredditConfig, SubredditPolicies};
use crate::retry::RetryConfig;
use crate::safety::SafetyConfig;
use agentlink_core::ConfigError;
use serde::Deserialize;

/// Everything the Reddit client can be tuned with. Usually read from the
/// `[reddit]` table of the host TOML file, then completed from the
/// environment with [`RedditClientConfig::apply_env`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedditClientConfig {
    pub poller: PollerConfig,
    pub dedup: DedupConfig,
    pub safety: SafetyConfig,
    pub retry: RetryConfig,
    pub limits: InteractionLimits,
    /// Rules for subreddits without their own entry
    pub default_policy: SubredditConfig,
    pub subreddits: Vec<SubredditConfig>,
    /// Posted to a mention when no response could be generated
    pub error_reply: Option<String>,
    /// Without `error_reply`, explain the failure to the mentioning user
    pub explain_errors: bool,
}

impl RedditClientConfig {
    /// Environment values override file values; `REDDIT_SUBREDDIT` entries
    /// without a config of their own get the default policy plus
    /// `REDDIT_TOPIC`/`REDDIT_TOPIC_2` as allowed topics.
    pub fn apply_env(&mut self, env: &RedditEnv) {
        if let Some(interval) = env.poll_interval {
            self.poller.interval_secs = interval.as_secs();
        }
        if let Some(limit) = env.comments_limit {
            self.poller.comments_limit = limit;
        }
        if let Some(cooldown) = env.comment_cooldown {
            self.limits.comment_cooldown_secs = cooldown.as_secs();
        }
        if let Some(max) = env.max_comments_per_day {
            self.limits.max_daily_comments = max;
        }

        for name in &env.subreddits {
            let known = self
                .subreddits
                .iter()
                .any(|config| config.name.eq_ignore_ascii_case(name));
            if !known {
                self.subreddits.push(SubredditConfig {
                    name: name.clone(),
                    allowed_topics: env.topics.clone(),
                    ..self.default_policy.clone()
                });
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poller.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poller.interval_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.poller.max_items_per_check == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poller.max_items_per_check".to_string(),
                value: "0".to_string(),
            });
        }
        if self.safety.warning_threshold == 0 || self.safety.error_threshold == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "safety thresholds must be positive".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                value: "0".to_string(),
            });
        }
        for subreddit in &self.subreddits {
            subreddit.validate()?;
        }
        Ok(())
    }

    pub fn policies(&self) -> Result<SubredditPolicies, ConfigError> {
        let mut policies = SubredditPolicies::new(self.default_policy.clone());
        for subreddit in &self.subreddits {
            policies.configure(subreddit.clone())?;
        }
        Ok(policies)
    }

    pub fn error_reply_mode(&self) -> ErrorReply {
        match (&self.error_reply, self.explain_errors) {
            (Some(text), _) => ErrorReply::Fixed(text.clone()),
            (None, true) => ErrorReply::Explain,
            (None, false) => ErrorReply::Silent,
        }
    }

    pub fn subreddit_names(&self) -> Vec<String> {
        self.subreddits.iter().map(|s| s.name.clone()).collect()
    }
}
