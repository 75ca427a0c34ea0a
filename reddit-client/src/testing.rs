//! In-memory stand-ins for Reddit and the agent runtime.

use crate::service::RedditApi;
use agentlink_core::{
    AgentRuntime, CommentOrigin, Content, CoreError, LlmError, Memory, PostType, RedditApiError,
    RedditComment, RedditPost, RedditUser, ResponseDecision, State,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

pub const BOT_NAME: &str = "agentlink_bot";

pub fn post(id: &str, subreddit: &str, title: &str) -> RedditPost {
    RedditPost {
        id: id.to_string(),
        title: title.to_string(),
        content: Some(format!("Body of {}", id)),
        author: "curious_user".to_string(),
        subreddit: subreddit.to_string(),
        url: format!("https://www.reddit.com/r/{}/comments/{}", subreddit, id),
        created_utc: 1_700_000_000,
        post_type: PostType::Text,
    }
}

pub fn mention(id: &str, body: &str) -> RedditComment {
    RedditComment {
        id: id.to_string(),
        body: body.to_string(),
        author: "fan".to_string(),
        subreddit: "rust".to_string(),
        created_utc: 1_700_000_000,
        parent_id: Some("t3_p0".to_string()),
        link_id: Some("t3_p0".to_string()),
        origin: CommentOrigin::Mention,
    }
}

#[derive(Default)]
pub struct MockRedditApi {
    posts: Mutex<HashMap<String, Vec<RedditPost>>>,
    comments: Mutex<HashMap<String, Vec<RedditComment>>>,
    mentions: Mutex<Vec<RedditComment>>,
    users: Mutex<HashMap<String, RedditUser>>,
    failing_subreddits: Mutex<HashSet<String>>,
    reply_error: Mutex<Option<RedditApiError>>,
    reply_delay: Mutex<Option<Duration>>,
    pub replies: Mutex<Vec<(String, String)>>,
    pub reply_calls: AtomicUsize,
    pub user_about_calls: AtomicUsize,
    pub current_user_calls: AtomicUsize,
}

impl MockRedditApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(self, subreddit: &str, posts: Vec<RedditPost>) -> Self {
        self.set_posts(subreddit, posts);
        self
    }

    pub fn set_posts(&self, subreddit: &str, posts: Vec<RedditPost>) {
        self.posts
            .lock()
            .unwrap()
            .insert(subreddit.to_lowercase(), posts);
    }

    pub fn with_comments(self, post_id: &str, comments: Vec<RedditComment>) -> Self {
        self.comments
            .lock()
            .unwrap()
            .insert(post_id.to_string(), comments);
        self
    }

    pub fn with_mentions(self, mentions: Vec<RedditComment>) -> Self {
        *self.mentions.lock().unwrap() = mentions;
        self
    }

    pub fn with_user(self, user: RedditUser) -> Self {
        self.users.lock().unwrap().insert(user.name.clone(), user);
        self
    }

    pub fn failing_subreddit(self, subreddit: &str) -> Self {
        self.failing_subreddits
            .lock()
            .unwrap()
            .insert(subreddit.to_lowercase());
        self
    }

    pub fn failing_replies(self, error: RedditApiError) -> Self {
        *self.reply_error.lock().unwrap() = Some(error);
        self
    }

    pub fn slow_replies(self, delay: Duration) -> Self {
        *self.reply_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn reply_count(&self) -> usize {
        self.reply_calls.load(Ordering::SeqCst)
    }

    pub fn replied_to(&self) -> Vec<String> {
        self.replies
            .lock()
            .unwrap()
            .iter()
            .map(|(thing_id, _)| thing_id.clone())
            .collect()
    }
}

#[async_trait]
impl RedditApi for MockRedditApi {
    async fn current_user(&self) -> Result<RedditUser, CoreError> {
        self.current_user_calls.fetch_add(1, Ordering::SeqCst);
        Ok(RedditUser {
            name: BOT_NAME.to_string(),
            created_utc: 1_500_000_000,
            link_karma: 1,
            comment_karma: 1,
        })
    }

    async fn user_about(&self, username: &str) -> Result<RedditUser, CoreError> {
        self.user_about_calls.fetch_add(1, Ordering::SeqCst);
        self.users
            .lock()
            .unwrap()
            .get(username)
            .cloned()
            .ok_or_else(|| {
                CoreError::RedditApi(RedditApiError::ThingNotFound {
                    thing_id: username.to_string(),
                })
            })
    }

    async fn new_posts(&self, subreddit: &str, limit: u32) -> Result<Vec<RedditPost>, CoreError> {
        let key = subreddit.to_lowercase();
        if self.failing_subreddits.lock().unwrap().contains(&key) {
            return Err(CoreError::RedditApi(RedditApiError::ServerError {
                status_code: 503,
            }));
        }
        Ok(self
            .posts
            .lock()
            .unwrap()
            .get(&key)
            .map(|posts| posts.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn post_comments(
        &self,
        post_id: &str,
        limit: u32,
    ) -> Result<Vec<RedditComment>, CoreError> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .get(post_id)
            .map(|comments| comments.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn mentions(&self, limit: u32) -> Result<Vec<RedditComment>, CoreError> {
        Ok(self
            .mentions
            .lock()
            .unwrap()
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn inbox(&self, _limit: u32) -> Result<Vec<RedditComment>, CoreError> {
        Ok(Vec::new())
    }

    async fn reply(&self, thing_id: &str, text: &str) -> Result<String, CoreError> {
        let call = self.reply_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.reply_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.reply_error.lock().unwrap().clone() {
            return Err(CoreError::RedditApi(error));
        }
        self.replies
            .lock()
            .unwrap()
            .push((thing_id.to_string(), text.to_string()));
        Ok(format!("reply{}", call))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Text,
    ContentFiltered,
    Unavailable,
}

pub struct MockRuntime {
    agent_id: Uuid,
    settings: HashMap<String, String>,
    decision: Mutex<ResponseDecision>,
    generation: Mutex<Generation>,
    pub memories: Mutex<Vec<Memory>>,
    pub should_respond_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
}

impl MockRuntime {
    pub fn new() -> Self {
        let settings = [
            ("REDDIT_CLIENT_ID", "client-id"),
            ("REDDIT_CLIENT_SECRET", "client-secret"),
            ("REDDIT_REFRESH_TOKEN", "refresh-token"),
            ("REDDIT_USER_AGENT", "agentlink-tests/0.1"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            agent_id: Uuid::new_v4(),
            settings,
            decision: Mutex::new(ResponseDecision::Respond),
            generation: Mutex::new(Generation::Text),
            memories: Mutex::new(Vec::new()),
            should_respond_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_setting(mut self, key: &str, value: &str) -> Self {
        self.settings.insert(key.to_string(), value.to_string());
        self
    }

    pub fn without_setting(mut self, key: &str) -> Self {
        self.settings.remove(key);
        self
    }

    pub fn deciding(self, decision: ResponseDecision) -> Self {
        *self.decision.lock().unwrap() = decision;
        self
    }

    pub fn generating(self, generation: Generation) -> Self {
        self.set_generation(generation);
        self
    }

    pub fn set_generation(&self, generation: Generation) {
        *self.generation.lock().unwrap() = generation;
    }

    pub fn generate_count(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentRuntime for MockRuntime {
    fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    fn get_setting(&self, key: &str) -> Option<String> {
        self.settings.get(key).filter(|v| !v.is_empty()).cloned()
    }

    async fn create_memory(&self, memory: Memory) -> Result<(), CoreError> {
        self.memories.lock().unwrap().push(memory);
        Ok(())
    }

    async fn compose_state(&self, memory: &Memory) -> Result<State, CoreError> {
        let mut state = State::default();
        state.set("message", memory.content.text.clone());
        state.recent_messages.push(memory.clone());
        Ok(state)
    }

    async fn should_respond(&self, _state: &State) -> Result<ResponseDecision, CoreError> {
        self.should_respond_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.decision.lock().unwrap())
    }

    async fn generate_response(&self, state: &State) -> Result<Content, CoreError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let generation = *self.generation.lock().unwrap();
        match generation {
            Generation::Text => Ok(Content {
                text: format!("Thoughts on: {}", state.get("message").unwrap_or_default()),
                source: "reddit".to_string(),
                ..Default::default()
            }),
            Generation::ContentFiltered => Err(CoreError::Llm(LlmError::ContentFiltered {
                reason: "policy".to_string(),
            })),
            Generation::Unavailable => Err(CoreError::Llm(LlmError::ServiceUnavailable {
                provider: "mock".to_string(),
            })),
        }
    }
}
