use agentlink_core::{ConfigError, PostType, RedditItem, RedditUser};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Per-subreddit interaction rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubredditConfig {
    pub name: String,
    /// Submissions must mention one of these; empty allows any topic
    pub allowed_topics: Vec<String>,
    pub forbidden_topics: Vec<String>,
    pub allowed_post_types: Vec<PostType>,
    pub minimum_karma: i64,
    pub minimum_account_age_days: i64,
    /// Free-form rules passed to the runtime as context
    pub custom_rules: Vec<String>,
}

impl Default for SubredditConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            allowed_topics: Vec::new(),
            forbidden_topics: vec!["politics".to_string(), "nsfw".to_string()],
            allowed_post_types: vec![PostType::Text, PostType::Link],
            minimum_karma: 0,
            minimum_account_age_days: 0,
            custom_rules: Vec::new(),
        }
    }
}

impl SubredditConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "subreddit.name".to_string(),
            });
        }
        if self.minimum_karma < 0 {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.minimum_karma", self.name),
                value: self.minimum_karma.to_string(),
            });
        }
        if self.minimum_account_age_days < 0 {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.minimum_account_age_days", self.name),
                value: self.minimum_account_age_days.to_string(),
            });
        }
        if self
            .allowed_topics
            .iter()
            .chain(self.forbidden_topics.iter())
            .any(|topic| topic.trim().is_empty())
        {
            return Err(ConfigError::ValidationFailed {
                reason: format!("r/{} has an empty topic", self.name),
            });
        }
        Ok(())
    }

    /// Karma or account age checks need the author's profile.
    pub fn needs_author_profile(&self) -> bool {
        self.minimum_karma > 0 || self.minimum_account_age_days > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("mentions forbidden topic '{topic}'")]
    ForbiddenTopic { topic: String },

    #[error("matches none of the allowed topics")]
    NoAllowedTopic,

    #[error("post type {post_type:?} not allowed")]
    PostTypeNotAllowed { post_type: PostType },

    #[error("author karma {karma} below {minimum}")]
    KarmaTooLow { karma: i64, minimum: i64 },

    #[error("author account {age_days} days old, needs {minimum}")]
    AccountTooNew { age_days: i64, minimum: i64 },
}

fn mentions(haystack: &str, topic: &str) -> bool {
    haystack.contains(&topic.trim().to_lowercase())
}

/// Subreddit rules keyed by lower-cased name, with a fallback for the rest.
#[derive(Debug, Clone, Default)]
pub struct SubredditPolicies {
    configs: HashMap<String, SubredditConfig>,
    fallback: SubredditConfig,
}

impl SubredditPolicies {
    pub fn new(fallback: SubredditConfig) -> Self {
        Self {
            configs: HashMap::new(),
            fallback,
        }
    }

    pub fn configure(&mut self, config: SubredditConfig) -> Result<(), ConfigError> {
        config.validate()?;
        info!(
            "Configured r/{}: allowed topics {:?}, forbidden topics {:?}, post types {:?}",
            config.name, config.allowed_topics, config.forbidden_topics, config.allowed_post_types
        );
        self.configs
            .insert(config.name.trim().to_lowercase(), config);
        Ok(())
    }

    pub fn get(&self, subreddit: &str) -> &SubredditConfig {
        self.configs
            .get(&subreddit.to_lowercase())
            .unwrap_or(&self.fallback)
    }

    pub fn is_configured(&self, subreddit: &str) -> bool {
        self.configs.contains_key(&subreddit.to_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        self.configs.values().map(|c| c.name.clone()).collect()
    }

    /// Content rules that need no vendor call. Allowed topics and post
    /// types only gate submissions; replies to us are judged on forbidden
    /// topics alone.
    pub fn check_content(&self, item: &RedditItem) -> Result<(), PolicyViolation> {
        let config = self.get(item.subreddit());
        let text = item.text().to_lowercase();

        if let Some(topic) = config
            .forbidden_topics
            .iter()
            .find(|topic| mentions(&text, topic))
        {
            return Err(PolicyViolation::ForbiddenTopic {
                topic: topic.clone(),
            });
        }

        if let RedditItem::Post(post) = item {
            if !config.allowed_post_types.contains(&post.post_type) {
                return Err(PolicyViolation::PostTypeNotAllowed {
                    post_type: post.post_type,
                });
            }
            if !config.allowed_topics.is_empty()
                && !config.allowed_topics.iter().any(|topic| mentions(&text, topic))
            {
                return Err(PolicyViolation::NoAllowedTopic);
            }
        }

        debug!("r/{} content rules passed for {}", item.subreddit(), item.id());
        Ok(())
    }

    pub fn check_author(
        &self,
        subreddit: &str,
        author: &RedditUser,
        now: DateTime<Utc>,
    ) -> Result<(), PolicyViolation> {
        let config = self.get(subreddit);

        let karma = author.total_karma();
        if karma < config.minimum_karma {
            return Err(PolicyViolation::KarmaTooLow {
                karma,
                minimum: config.minimum_karma,
            });
        }

        let age_days = author.account_age_days(now);
        if age_days < config.minimum_account_age_days {
            return Err(PolicyViolation::AccountTooNew {
                age_days,
                minimum: config.minimum_account_age_days,
            });
        }
        Ok(())
    }
}
