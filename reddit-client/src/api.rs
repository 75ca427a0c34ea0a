use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use agentlink_core::{
    CommentOrigin, CoreError, PostType, RedditApiError, RedditComment, RedditPost, RedditUser,
};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    pub subreddit: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub is_video: bool,
}

/// Comments, mentions and inbox messages share this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: Option<String>,
    pub created_utc: f64,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub link_id: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditUserData {
    pub name: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub link_karma: i64,
    #[serde(default)]
    pub comment_karma: i64,
}

#[derive(Debug, Deserialize)]
struct CommentSubmitResponse {
    json: CommentSubmitJson,
}

#[derive(Debug, Deserialize)]
struct CommentSubmitJson {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    data: Option<CommentSubmitData>,
}

#[derive(Debug, Deserialize)]
struct CommentSubmitData {
    #[serde(default)]
    things: Vec<RedditListingChild<RedditCommentData>>,
}

/// Thin typed wrapper over the Reddit OAuth API.
#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: RateLimiter,
    user_agent: String,
    base_url: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String) -> Result<Self, CoreError> {
        Self::with_base_url(user_agent, REDDIT_API_BASE.to_string())
    }

    pub fn with_base_url(user_agent: String, base_url: String) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(RateLimitConfig::reddit_oauth()),
            user_agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
        form: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let permit = self.rate_limiter.acquire_permit().await?;
        debug!(
            "Acquired rate limit permit for {} {} after {:?}",
            method, endpoint, permit.queue_wait_time
        );

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .header("User-Agent", &self.user_agent);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }
        if let Some(fields) = form {
            request_builder = request_builder.form(fields);
        }

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        warn!("Request failed with status: {} for {}", status, endpoint);
        let error = match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.trim().parse::<f64>().ok())
                    .map(|seconds| seconds.ceil() as u64)
                    .unwrap_or(60);
                RedditApiError::RateLimitExceeded { retry_after }
            }
            401 => RedditApiError::InvalidToken,
            403 => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            },
            404 => RedditApiError::ThingNotFound {
                thing_id: endpoint.to_string(),
            },
            code => RedditApiError::ServerError { status_code: code },
        };
        Err(CoreError::RedditApi(error))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
    ) -> Result<T, CoreError> {
        let response = self
            .make_request(Method::GET, endpoint, access_token, query_params, None)
            .await?;

        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse response from {}: {}", endpoint, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse response from {}", endpoint),
            })
        })
    }

    pub async fn get_me(&self, access_token: &str) -> Result<RedditUserData, CoreError> {
        let user: RedditUserData = self.get_json("/api/v1/me", access_token, None).await?;
        debug!("Retrieved user info for: {}", user.name);
        Ok(user)
    }

    pub async fn get_user_about(
        &self,
        access_token: &str,
        username: &str,
    ) -> Result<RedditUserData, CoreError> {
        let endpoint = format!("/user/{}/about", username);
        let about: RedditListingChild<RedditUserData> =
            self.get_json(&endpoint, access_token, None).await?;
        Ok(about.data)
    }

    pub async fn get_new_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        limit: u32,
    ) -> Result<Vec<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/new", subreddit);
        let limit_str = limit.to_string();
        let params = [("limit", limit_str.as_str()), ("raw_json", "1")];

        let listing: RedditListing<RedditPostData> = match self
            .get_json(&endpoint, access_token, Some(&params))
            .await
        {
            Err(CoreError::RedditApi(RedditApiError::ThingNotFound { .. })) => {
                return Err(CoreError::RedditApi(RedditApiError::SubredditNotFound {
                    subreddit: subreddit.to_string(),
                }))
            }
            other => other?,
        };

        info!(
            "Retrieved {} posts from r/{}",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing.data.children.into_iter().map(|c| c.data).collect())
    }

    /// `/comments/{id}` answers with two listings: the post, then its comments.
    pub async fn get_post_comments(
        &self,
        access_token: &str,
        post_id: &str,
        limit: u32,
    ) -> Result<Vec<RedditCommentData>, CoreError> {
        let endpoint = format!("/comments/{}", post_id);
        let limit_str = limit.to_string();
        let params = [
            ("limit", limit_str.as_str()),
            ("depth", "1"),
            ("sort", "new"),
            ("raw_json", "1"),
        ];

        let listings: Vec<RedditListing<serde_json::Value>> =
            self.get_json(&endpoint, access_token, Some(&params)).await?;

        let comments = listings
            .into_iter()
            .nth(1)
            .map(|listing| {
                listing
                    .data
                    .children
                    .into_iter()
                    .filter(|child| child.kind == "t1")
                    .filter_map(|child| serde_json::from_value::<RedditCommentData>(child.data).ok())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        debug!("Retrieved {} comments for post {}", comments.len(), post_id);
        Ok(comments)
    }

    pub async fn get_messages(
        &self,
        access_token: &str,
        folder: &str,
        limit: u32,
    ) -> Result<Vec<RedditCommentData>, CoreError> {
        let endpoint = format!("/message/{}", folder);
        let limit_str = limit.to_string();
        let params = [("limit", limit_str.as_str()), ("raw_json", "1")];

        let listing: RedditListing<RedditCommentData> =
            self.get_json(&endpoint, access_token, Some(&params)).await?;

        Ok(listing.data.children.into_iter().map(|c| c.data).collect())
    }

    /// Replies to a post (`t3_`) or comment (`t1_`); returns the new comment id.
    pub async fn submit_comment(
        &self,
        access_token: &str,
        thing_id: &str,
        text: &str,
    ) -> Result<String, CoreError> {
        let form = [("thing_id", thing_id), ("text", text), ("api_type", "json")];
        let response = self
            .make_request(Method::POST, "/api/comment", access_token, None, Some(&form))
            .await?;

        let body: CommentSubmitResponse = response.json().await.map_err(|e| {
            error!("Failed to parse comment response: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: "Failed to parse comment response".to_string(),
            })
        })?;

        parse_submit_response(body)
    }
}

fn parse_submit_response(body: CommentSubmitResponse) -> Result<String, CoreError> {
    if let Some(first) = body.json.errors.first() {
        let code = first
            .first()
            .and_then(|v| v.as_str())
            .unwrap_or("UNKNOWN")
            .to_string();
        let message = first
            .get(1)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if code == "RATELIMIT" {
            return Err(CoreError::RedditApi(RedditApiError::RateLimitExceeded {
                retry_after: parse_ratelimit_message(&message),
            }));
        }
        return Err(CoreError::RedditApi(RedditApiError::CommentRejected {
            reason: format!("{}: {}", code, message),
        }));
    }

    body.json
        .data
        .and_then(|data| data.things.into_iter().next())
        .map(|thing| thing.data.id)
        .ok_or_else(|| {
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: "Comment response carried no comment".to_string(),
            })
        })
}

/// Reads "try again in 7 minutes" style hints; defaults to one minute.
fn parse_ratelimit_message(message: &str) -> u64 {
    let words: Vec<&str> = message.split_whitespace().collect();
    for pair in words.windows(2) {
        if let Ok(amount) = pair[0].parse::<u64>() {
            let unit = pair[1].to_ascii_lowercase();
            if unit.starts_with("minute") {
                return amount * 60;
            }
            if unit.starts_with("second") {
                return amount;
            }
        }
    }
    60
}

impl From<RedditPostData> for RedditPost {
    fn from(post_data: RedditPostData) -> Self {
        let post_type = PostType::classify(post_data.is_self, post_data.is_video, &post_data.url);
        Self {
            id: post_data.id,
            title: post_data.title,
            content: if post_data.is_self && !post_data.selftext.is_empty() {
                Some(post_data.selftext)
            } else {
                None
            },
            author: post_data.author,
            subreddit: post_data.subreddit,
            url: post_data.url,
            created_utc: post_data.created_utc as i64,
            post_type,
        }
    }
}

impl RedditCommentData {
    pub fn into_comment(self, origin: CommentOrigin) -> RedditComment {
        RedditComment {
            id: self.id,
            body: self.body,
            author: self.author,
            subreddit: self.subreddit.unwrap_or_default(),
            created_utc: self.created_utc as i64,
            parent_id: self.parent_id,
            link_id: self.link_id,
            origin,
        }
    }
}

impl From<RedditUserData> for RedditUser {
    fn from(user: RedditUserData) -> Self {
        Self {
            name: user.name,
            created_utc: user.created_utc as i64,
            link_karma: user.link_karma,
            comment_karma: user.comment_karma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_client_creation() {
        let client = RedditApiClient::new("test-user-agent/1.0".to_string()).unwrap();
        assert_eq!(client.user_agent(), "test-user-agent/1.0");
    }

    #[test]
    fn test_reddit_post_conversion() {
        let post_data: RedditPostData = serde_json::from_value(serde_json::json!({
            "id": "test123",
            "title": "Test Post",
            "selftext": "This is test content",
            "author": "test_user",
            "subreddit": "test",
            "url": "https://reddit.com/r/test/comments/test123",
            "created_utc": 1640995200.0,
            "is_self": true
        }))
        .unwrap();

        let reddit_post: RedditPost = post_data.into();
        assert_eq!(reddit_post.id, "test123");
        assert_eq!(reddit_post.author, "test_user");
        assert_eq!(reddit_post.post_type, PostType::Text);
        assert_eq!(
            reddit_post.content,
            Some("This is test content".to_string())
        );
    }

    #[test]
    fn test_image_link_post_has_no_content() {
        let post_data: RedditPostData = serde_json::from_value(serde_json::json!({
            "id": "img1",
            "title": "Look",
            "subreddit": "pics",
            "url": "https://i.redd.it/abc.png",
            "created_utc": 1.0
        }))
        .unwrap();

        let post: RedditPost = post_data.into();
        assert_eq!(post.post_type, PostType::Image);
        assert!(post.content.is_none());
    }

    #[test]
    fn test_submit_response_returns_new_id() {
        let body: CommentSubmitResponse = serde_json::from_value(serde_json::json!({
            "json": {
                "errors": [],
                "data": { "things": [ { "kind": "t1", "data": {
                    "id": "c42", "body": "hi", "author": "bot", "created_utc": 2.0
                } } ] }
            }
        }))
        .unwrap();

        assert_eq!(parse_submit_response(body).unwrap(), "c42");
    }

    #[test]
    fn test_submit_response_ratelimit_maps_to_retryable_error() {
        let body: CommentSubmitResponse = serde_json::from_value(serde_json::json!({
            "json": { "errors": [["RATELIMIT", "you are doing that too much. try again in 2 minutes.", "ratelimit"]] }
        }))
        .unwrap();

        match parse_submit_response(body) {
            Err(CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after })) => {
                assert_eq!(retry_after, 120)
            }
            other => panic!("Expected rate limit, got {:?}", other),
        }
    }

    #[test]
    fn test_submit_response_other_errors_are_rejections() {
        let body: CommentSubmitResponse = serde_json::from_value(serde_json::json!({
            "json": { "errors": [["THREAD_LOCKED", "that thread is locked", "parent"]] }
        }))
        .unwrap();

        assert!(matches!(
            parse_submit_response(body),
            Err(CoreError::RedditApi(RedditApiError::CommentRejected { .. }))
        ));
    }

    #[test]
    fn test_ratelimit_message_parsing() {
        assert_eq!(parse_ratelimit_message("try again in 9 seconds."), 9);
        assert_eq!(parse_ratelimit_message("try again in 1 minute."), 60);
        assert_eq!(parse_ratelimit_message("slow down"), 60);
    }
}
