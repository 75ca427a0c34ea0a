use crate::api::RedditApiClient;
use crate::auth::TokenManager;
use crate::environment::RedditEnv;
use agentlink_core::{
    CommentOrigin, CoreError, RedditApiError, RedditComment, RedditPost, RedditUser,
};
use async_trait::async_trait;
use tracing::warn;

/// Vendor operations the poller and dispatcher rely on.
#[async_trait]
pub trait RedditApi: Send + Sync {
    async fn current_user(&self) -> Result<RedditUser, CoreError>;

    async fn user_about(&self, username: &str) -> Result<RedditUser, CoreError>;

    async fn new_posts(&self, subreddit: &str, limit: u32) -> Result<Vec<RedditPost>, CoreError>;

    async fn post_comments(
        &self,
        post_id: &str,
        limit: u32,
    ) -> Result<Vec<RedditComment>, CoreError>;

    async fn mentions(&self, limit: u32) -> Result<Vec<RedditComment>, CoreError>;

    async fn inbox(&self, limit: u32) -> Result<Vec<RedditComment>, CoreError>;

    /// Posts `text` as a reply to the given fullname and returns the new comment id.
    async fn reply(&self, thing_id: &str, text: &str) -> Result<String, CoreError>;
}

/// Live Reddit access: OAuth tokens plus the HTTP client.
pub struct RedditService {
    api: RedditApiClient,
    tokens: TokenManager,
}

impl RedditService {
    pub fn new(env: &RedditEnv) -> Result<Self, CoreError> {
        Ok(Self {
            api: RedditApiClient::new(env.user_agent.clone())?,
            tokens: TokenManager::new(env)?,
        })
    }

    /// Runs `call` with a valid token, refreshing once if Reddit rejects it.
    async fn authorized<T, F, Fut>(&self, call: F) -> Result<T, CoreError>
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let token = self.tokens.access_token().await?;
        match call(token).await {
            Err(CoreError::RedditApi(RedditApiError::InvalidToken)) => {
                warn!("Access token rejected, refreshing and retrying once");
                self.tokens.invalidate().await;
                let token = self.tokens.access_token().await?;
                call(token).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl RedditApi for RedditService {
    async fn current_user(&self) -> Result<RedditUser, CoreError> {
        let user = self
            .authorized(|token| async move { self.api.get_me(&token).await })
            .await?;
        Ok(user.into())
    }

    async fn user_about(&self, username: &str) -> Result<RedditUser, CoreError> {
        let user = self
            .authorized(|token| async move { self.api.get_user_about(&token, username).await })
            .await?;
        Ok(user.into())
    }

    async fn new_posts(&self, subreddit: &str, limit: u32) -> Result<Vec<RedditPost>, CoreError> {
        let posts = self
            .authorized(|token| async move {
                self.api.get_new_posts(&token, subreddit, limit).await
            })
            .await?;
        Ok(posts.into_iter().map(RedditPost::from).collect())
    }

    async fn post_comments(
        &self,
        post_id: &str,
        limit: u32,
    ) -> Result<Vec<RedditComment>, CoreError> {
        let comments = self
            .authorized(|token| async move {
                self.api.get_post_comments(&token, post_id, limit).await
            })
            .await?;
        Ok(comments
            .into_iter()
            .map(|c| c.into_comment(CommentOrigin::Thread))
            .collect())
    }

    async fn mentions(&self, limit: u32) -> Result<Vec<RedditComment>, CoreError> {
        let messages = self
            .authorized(|token| async move {
                self.api.get_messages(&token, "mentions", limit).await
            })
            .await?;
        Ok(messages
            .into_iter()
            .map(|m| m.into_comment(CommentOrigin::Mention))
            .collect())
    }

    async fn inbox(&self, limit: u32) -> Result<Vec<RedditComment>, CoreError> {
        let messages = self
            .authorized(|token| async move { self.api.get_messages(&token, "inbox", limit).await })
            .await?;
        Ok(messages
            .into_iter()
            .map(|m| m.into_comment(CommentOrigin::Inbox))
            .collect())
    }

    async fn reply(&self, thing_id: &str, text: &str) -> Result<String, CoreError> {
        self.authorized(|token| async move {
            self.api.submit_comment(&token, thing_id, text).await
        })
        .await
    }
}
