use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Submission type as far as subreddit policy is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Text,
    Link,
    Image,
    Video,
}

impl PostType {
    pub fn classify(is_self: bool, is_video: bool, url: &str) -> Self {
        if is_video {
            return PostType::Video;
        }
        if is_self {
            return PostType::Text;
        }
        let lower = url.to_ascii_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or_default();
        if [".jpg", ".jpeg", ".png", ".gif"]
            .iter()
            .any(|ext| path.ends_with(ext))
        {
            PostType::Image
        } else {
            PostType::Link
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub author: String,
    pub subreddit: String,
    pub url: String,
    pub created_utc: i64,
    pub post_type: PostType,
}

/// Where a comment was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentOrigin {
    Thread,
    Mention,
    Inbox,
}

#[derive(Debug, Clone)]
pub struct RedditComment {
    pub id: String,
    pub body: String,
    pub author: String,
    pub subreddit: String,
    pub created_utc: i64,
    pub parent_id: Option<String>,
    pub link_id: Option<String>,
    pub origin: CommentOrigin,
}

#[derive(Debug, Clone)]
pub enum RedditItem {
    Post(RedditPost),
    Comment(RedditComment),
}

impl RedditItem {
    pub fn id(&self) -> &str {
        match self {
            RedditItem::Post(post) => &post.id,
            RedditItem::Comment(comment) => &comment.id,
        }
    }

    /// Reddit "fullname" used as `thing_id` when replying.
    pub fn fullname(&self) -> String {
        match self {
            RedditItem::Post(post) => format!("t3_{}", post.id),
            RedditItem::Comment(comment) => format!("t1_{}", comment.id),
        }
    }

    pub fn author(&self) -> &str {
        match self {
            RedditItem::Post(post) => &post.author,
            RedditItem::Comment(comment) => &comment.author,
        }
    }

    pub fn subreddit(&self) -> &str {
        match self {
            RedditItem::Post(post) => &post.subreddit,
            RedditItem::Comment(comment) => &comment.subreddit,
        }
    }

    pub fn created_utc(&self) -> i64 {
        match self {
            RedditItem::Post(post) => post.created_utc,
            RedditItem::Comment(comment) => comment.created_utc,
        }
    }

    pub fn text(&self) -> String {
        match self {
            RedditItem::Post(post) => match &post.content {
                Some(body) => format!("{}\n\n{}", post.title, body),
                None => post.title.clone(),
            },
            RedditItem::Comment(comment) => comment.body.clone(),
        }
    }

    /// Id of the submission the item belongs to.
    pub fn thread_id(&self) -> String {
        match self {
            RedditItem::Post(post) => post.id.clone(),
            RedditItem::Comment(comment) => comment
                .link_id
                .as_deref()
                .map(|link| link.trim_start_matches("t3_").to_string())
                .unwrap_or_else(|| comment.id.clone()),
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            RedditItem::Post(_) => "submission",
            RedditItem::Comment(comment) => match comment.origin {
                CommentOrigin::Thread => "comment",
                CommentOrigin::Mention => "mention",
                CommentOrigin::Inbox => "inbox",
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedditUser {
    pub name: String,
    pub created_utc: i64,
    pub link_karma: i64,
    pub comment_karma: i64,
}

impl RedditUser {
    pub fn total_karma(&self) -> i64 {
        self.link_karma + self.comment_karma
    }

    pub fn account_age_days(&self, now: DateTime<Utc>) -> i64 {
        match Utc.timestamp_opt(self.created_utc, 0).single() {
            Some(created) => (now - created).num_days(),
            None => 0,
        }
    }
}

/// Message content handed to and returned by the agent runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    pub text: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub agent_id: Uuid,
    pub room_id: Uuid,
    pub content: Content,
    pub created_at: i64,
}

/// Composed context for a single decision or generation call.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub values: HashMap<String, String>,
    pub recent_messages: Vec<Memory>,
}

impl State {
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDecision {
    Respond,
    Ignore,
    Stop,
}

impl ResponseDecision {
    /// Parses a model answer; anything unrecognised is treated as `Ignore`.
    pub fn parse(answer: &str) -> Self {
        let upper = answer.to_ascii_uppercase();
        if upper.contains("RESPOND") {
            ResponseDecision::Respond
        } else if upper.contains("STOP") {
            ResponseDecision::Stop
        } else {
            ResponseDecision::Ignore
        }
    }
}

/// Deterministic UUID for an arbitrary string key.
pub fn string_to_uuid(value: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, value.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_type_classification() {
        assert_eq!(PostType::classify(true, false, ""), PostType::Text);
        assert_eq!(PostType::classify(false, true, "https://v.redd.it/x"), PostType::Video);
        assert_eq!(
            PostType::classify(false, false, "https://i.redd.it/cat.PNG"),
            PostType::Image
        );
        assert_eq!(
            PostType::classify(false, false, "https://example.com/article"),
            PostType::Link
        );
    }

    #[test]
    fn test_response_decision_parse() {
        assert_eq!(ResponseDecision::parse("[RESPOND]"), ResponseDecision::Respond);
        assert_eq!(ResponseDecision::parse("stop"), ResponseDecision::Stop);
        assert_eq!(ResponseDecision::parse("IGNORE"), ResponseDecision::Ignore);
        assert_eq!(ResponseDecision::parse("maybe?"), ResponseDecision::Ignore);
    }

    #[test]
    fn test_string_to_uuid_is_stable() {
        assert_eq!(string_to_uuid("abc"), string_to_uuid("abc"));
        assert_ne!(string_to_uuid("abc"), string_to_uuid("abd"));
    }

    #[test]
    fn test_comment_thread_id_strips_prefix() {
        let item = RedditItem::Comment(RedditComment {
            id: "c1".to_string(),
            body: "hello".to_string(),
            author: "someone".to_string(),
            subreddit: "rust".to_string(),
            created_utc: 0,
            parent_id: Some("t3_p1".to_string()),
            link_id: Some("t3_p1".to_string()),
            origin: CommentOrigin::Thread,
        });
        assert_eq!(item.thread_id(), "p1");
        assert_eq!(item.fullname(), "t1_c1");
        assert_eq!(item.kind_label(), "comment");
    }

    #[test]
    fn test_account_age() {
        let user = RedditUser {
            name: "old_timer".to_string(),
            created_utc: 0,
            link_karma: 10,
            comment_karma: 5,
        };
        let now = Utc.timestamp_opt(86_400 * 40, 0).unwrap();
        assert_eq!(user.account_age_days(now), 40);
        assert_eq!(user.total_karma(), 15);
    }
}
