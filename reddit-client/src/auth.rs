use crate::environment::RedditEnv;
use agentlink_core::{ConfigError, CoreError, RedditApiError};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

const AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens are refreshed this long before Reddit would expire them.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: Instant,
}

impl RedditToken {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

/// Exchanges the long-lived refresh token for short-lived access tokens.
pub struct TokenManager {
    oauth: BasicClient,
    refresh_token: RefreshToken,
    cached: Mutex<Option<RedditToken>>,
}

impl TokenManager {
    pub fn new(env: &RedditEnv) -> Result<Self, ConfigError> {
        let auth_url = AuthUrl::new(AUTH_URL.to_string()).map_err(|_| ConfigError::InvalidValue {
            field: "auth_url".to_string(),
            value: AUTH_URL.to_string(),
        })?;
        let token_url =
            TokenUrl::new(TOKEN_URL.to_string()).map_err(|_| ConfigError::InvalidValue {
                field: "token_url".to_string(),
                value: TOKEN_URL.to_string(),
            })?;

        let oauth = BasicClient::new(
            ClientId::new(env.client_id.clone()),
            Some(ClientSecret::new(env.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::BasicAuth);

        Ok(Self {
            oauth,
            refresh_token: RefreshToken::new(env.refresh_token.clone()),
            cached: Mutex::new(None),
        })
    }

    /// Returns a usable access token, refreshing it when close to expiry.
    pub async fn access_token(&self) -> Result<String, CoreError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.access_token.clone());
            }
            debug!("Access token close to expiry, refreshing");
        }

        let token = self.refresh().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Drops the cached token so the next call refreshes it.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn refresh(&self) -> Result<RedditToken, CoreError> {
        let response = self
            .oauth
            .exchange_refresh_token(&self.refresh_token)
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                    reason: e.to_string(),
                })
            })?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        info!("Obtained Reddit access token valid for {:?}", lifetime);

        Ok(RedditToken {
            access_token: response.access_token().secret().clone(),
            expires_at: Instant::now() + lifetime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_freshness_respects_margin() {
        let now = Instant::now();
        let fresh = RedditToken {
            access_token: "a".to_string(),
            expires_at: now + Duration::from_secs(3600),
        };
        let stale = RedditToken {
            access_token: "b".to_string(),
            expires_at: now + Duration::from_secs(30),
        };

        assert!(fresh.is_fresh(now));
        assert!(!stale.is_fresh(now));
    }
}
