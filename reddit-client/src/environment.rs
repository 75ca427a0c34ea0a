use agentlink_core::settings::{optional, optional_positive, require, SettingsSource};
use agentlink_core::ConfigError;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Reddit credentials and overrides read from runtime settings.
#[derive(Clone)]
pub struct RedditEnv {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub subreddits: Vec<String>,
    pub topics: Vec<String>,
    pub comment_cooldown: Option<Duration>,
    pub max_comments_per_day: Option<u32>,
    pub comments_limit: Option<u32>,
    pub poll_interval: Option<Duration>,
}

impl std::fmt::Debug for RedditEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditEnv")
            .field("client_id", &self.client_id)
            .field("user_agent", &self.user_agent)
            .field("subreddits", &self.subreddits)
            .field("topics", &self.topics)
            .field("comment_cooldown", &self.comment_cooldown)
            .field("max_comments_per_day", &self.max_comments_per_day)
            .field("comments_limit", &self.comments_limit)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl RedditEnv {
    pub fn from_settings<S: SettingsSource + ?Sized>(source: &S) -> Result<Self, ConfigError> {
        let client_id = require(source, "REDDIT_CLIENT_ID")?;
        let client_secret = require(source, "REDDIT_CLIENT_SECRET")?;
        let refresh_token = require(source, "REDDIT_REFRESH_TOKEN")?;
        let user_agent = require(source, "REDDIT_USER_AGENT")?;

        let subreddits = optional(source, "REDDIT_SUBREDDIT")
            .map(|raw| {
                raw.split(',')
                    .map(subreddit_name)
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let topics = ["REDDIT_TOPIC", "REDDIT_TOPIC_2"]
            .iter()
            .filter_map(|key| optional(source, key))
            .collect();

        let to_u32 = |key: &str, value: u64| {
            u32::try_from(value).map_err(|_| ConfigError::InvalidValue {
                field: key.to_string(),
                value: value.to_string(),
            })
        };

        let comments_limit = optional_positive(source, "REDDIT_COMMENTS_LIMIT")?
            .map(|v| to_u32("REDDIT_COMMENTS_LIMIT", v))
            .transpose()?;
        let max_comments_per_day = optional_positive(source, "REDDIT_MAX_COMMENTS_PER_DAY")?
            .map(|v| to_u32("REDDIT_MAX_COMMENTS_PER_DAY", v))
            .transpose()?;
        let comment_cooldown =
            optional_positive(source, "REDDIT_COMMENT_COOLDOWN")?.map(Duration::from_secs);
        let poll_interval = optional_positive(source, "REDDIT_POLL_INTERVAL")?
            .map(|secs| Duration::from_secs(secs).clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL));

        let env = Self {
            client_id,
            client_secret,
            refresh_token,
            user_agent,
            subreddits,
            topics,
            comment_cooldown,
            max_comments_per_day,
            comments_limit,
            poll_interval,
        };
        debug!("Validated Reddit environment: {:?}", env);
        Ok(env)
    }
}

/// Accepts `rust`, `r/rust` or `https://www.reddit.com/r/rust/`.
pub fn subreddit_name(raw: &str) -> String {
    let raw = raw.trim();
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw.to_string(),
    };
    let trimmed = path.as_str();
    let name = match trimmed.find("/r/") {
        Some(index) => &trimmed[index + 3..],
        None => trimmed.strip_prefix("r/").unwrap_or(trimmed),
    };
    name.split('/').next().unwrap_or_default().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlink_core::settings::MapSettings;

    fn credentials() -> MapSettings {
        MapSettings::default()
            .with("REDDIT_CLIENT_ID", "id")
            .with("REDDIT_CLIENT_SECRET", "secret")
            .with("REDDIT_REFRESH_TOKEN", "refresh")
            .with("REDDIT_USER_AGENT", "agentlink/0.1 by tester")
    }

    #[test]
    fn test_missing_credential_is_reported_by_name() {
        let settings = MapSettings::default()
            .with("REDDIT_CLIENT_ID", "id")
            .with("REDDIT_CLIENT_SECRET", "secret")
            .with("REDDIT_REFRESH_TOKEN", "refresh");

        match RedditEnv::from_settings(&settings) {
            Err(ConfigError::MissingEnvironmentVariable { var_name }) => {
                assert_eq!(var_name, "REDDIT_USER_AGENT")
            }
            other => panic!("Expected missing user agent, got {:?}", other),
        }
    }

    #[test]
    fn test_subreddits_and_topics() {
        let settings = credentials()
            .with(
                "REDDIT_SUBREDDIT",
                "https://www.reddit.com/r/rust/, r/programming,,tokio",
            )
            .with("REDDIT_TOPIC", "async")
            .with("REDDIT_TOPIC_2", "embedded");

        let env = RedditEnv::from_settings(&settings).unwrap();
        assert_eq!(env.subreddits, vec!["rust", "programming", "tokio"]);
        assert_eq!(env.topics, vec!["async", "embedded"]);
        assert!(env.poll_interval.is_none());
    }

    #[test]
    fn test_numeric_settings_are_type_checked() {
        let settings = credentials().with("REDDIT_COMMENT_COOLDOWN", "soon");
        assert!(matches!(
            RedditEnv::from_settings(&settings),
            Err(ConfigError::InvalidValue { .. })
        ));

        let settings = credentials().with("REDDIT_MAX_COMMENTS_PER_DAY", "0");
        assert!(RedditEnv::from_settings(&settings).is_err());
    }

    #[test]
    fn test_poll_interval_is_clamped() {
        let settings = credentials()
            .with("REDDIT_POLL_INTERVAL", "1")
            .with("REDDIT_COMMENT_COOLDOWN", "90");
        let env = RedditEnv::from_settings(&settings).unwrap();
        assert_eq!(env.poll_interval, Some(MIN_POLL_INTERVAL));
        assert_eq!(env.comment_cooldown, Some(Duration::from_secs(90)));

        let settings = credentials().with("REDDIT_POLL_INTERVAL", "3600");
        let env = RedditEnv::from_settings(&settings).unwrap();
        assert_eq!(env.poll_interval, Some(MAX_POLL_INTERVAL));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let env = RedditEnv::from_settings(&credentials()).unwrap();
        let rendered = format!("{:?}", env);
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("refresh"));
    }

    #[test]
    fn test_subreddit_name_from_url_with_query() {
        assert_eq!(
            subreddit_name("https://old.reddit.com/r/learnrust/?sort=new"),
            "learnrust"
        );
        assert_eq!(subreddit_name(" r/tokio "), "tokio");
    }
}
