//! Access token management.
//!
//! ALOR issues short-lived JWT access tokens in exchange for a long-lived
//! refresh token: `POST {oauth}/refresh?token={refreshToken}` answers with
//! `{"AccessToken": "..."}`. Access tokens live 30 minutes; the
//! [`TokenProvider`] reuses one for [`TOKEN_TTL`] and then refreshes it.
//!
//! Without a refresh token the provider runs in anonymous mode and hands
//! out an empty token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::Result;
use crate::error::{AlorError, ApiError};

/// How long a fetched access token is reused before refreshing.
pub const TOKEN_TTL: Duration = Duration::from_secs(25 * 60);

/// Source of bearer tokens for REST calls and subscribe frames.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns a valid access token, or an empty string in anonymous mode.
    async fn token(&self) -> Result<String>;
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<String>;
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(rename = "AccessToken")]
    access_token: String,
}

/// Refreshes tokens against the ALOR OAuth service.
pub struct OAuthRefresher {
    http: reqwest::Client,
    oauth_url: String,
}

impl OAuthRefresher {
    #[must_use]
    pub fn new(http: reqwest::Client, oauth_url: impl Into<String>) -> Self {
        Self {
            http,
            oauth_url: oauth_url.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<String> {
        let url = format!("{}/refresh", self.oauth_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .query(&[("token", refresh_token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError {
                status: status.as_u16(),
                message,
                request_guid: None,
            }
            .into());
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AlorError::Auth(format!("unexpected refresh response: {e}")))?;
        if body.access_token.is_empty() {
            return Err(AlorError::Auth("refresh returned an empty token".into()));
        }

        info!("Obtained access token");
        Ok(body.access_token)
    }
}

#[derive(Default)]
struct TokenState {
    token: Option<Zeroizing<String>>,
    expires_at: Option<Instant>,
}

/// Caches the current access token and refreshes it when it expires.
///
/// The cache lock is held across the refresh call, so concurrent callers
/// wait for a single refresh instead of issuing their own.
pub struct TokenProvider {
    refresh_token: Option<Zeroizing<String>>,
    refresher: Arc<dyn TokenRefresher>,
    state: Mutex<TokenState>,
    ttl: Duration,
}

impl TokenProvider {
    #[must_use]
    pub fn new(
        refresh_token: Option<Zeroizing<String>>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            refresher,
            state: Mutex::new(TokenState::default()),
            ttl: TOKEN_TTL,
        }
    }

    /// Returns `true` when no refresh token is configured.
    pub fn is_anonymous(&self) -> bool {
        self.refresh_token.is_none()
    }

    /// Returns a valid access token, refreshing it if the cached one has
    /// expired.
    ///
    /// # Errors
    ///
    /// Returns the refresher's error; the cache is cleared so the next call
    /// retries.
    pub async fn get_token(&self) -> Result<String> {
        let Some(refresh_token) = self.refresh_token.as_ref() else {
            return Ok(String::new());
        };

        let mut state = self.state.lock().await;
        if let (Some(token), Some(expires_at)) = (state.token.as_ref(), state.expires_at) {
            if Instant::now() < expires_at {
                debug!("Reusing cached access token");
                return Ok(token.as_str().to_owned());
            }
        }

        match self.refresher.refresh(refresh_token).await {
            Ok(token) => {
                state.expires_at = Some(Instant::now() + self.ttl);
                state.token = Some(Zeroizing::new(token.clone()));
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, "Access token refresh failed");
                *state = TokenState::default();
                Err(e)
            }
        }
    }

    /// Drops the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.state.lock().await = TokenState::default();
    }
}

#[async_trait]
impl TokenSource for TokenProvider {
    async fn token(&self) -> Result<String> {
        self.get_token().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[derive(Default)]
    struct CountingRefresher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(AlorError::Auth("revoked".into()));
            }
            Ok(format!("jwt-{n}"))
        }
    }

    fn provider(refresher: Arc<CountingRefresher>) -> TokenProvider {
        TokenProvider::new(Some(Zeroizing::new("refresh".into())), refresher)
    }

    #[tokio::test]
    async fn anonymous_mode_returns_empty_token() {
        let refresher = Arc::new(CountingRefresher::default());
        let tokens = TokenProvider::new(None, refresher.clone());

        assert!(tokens.is_anonymous());
        assert_eq!(tokens.get_token().await.unwrap(), "");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn token_is_reused_within_the_window() {
        let refresher = Arc::new(CountingRefresher::default());
        let tokens = provider(refresher.clone());

        assert_eq!(tokens.get_token().await.unwrap(), "jwt-1");
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(tokens.get_token().await.unwrap(), "jwt-1");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(TOKEN_TTL).await;
        assert_eq!(tokens.get_token().await.unwrap(), "jwt-2");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let refresher = Arc::new(CountingRefresher::default());
        let tokens = Arc::new(provider(refresher.clone()));

        let (a, b) = tokio::join!(tokens.get_token(), tokens.get_token());
        assert_eq!(a.unwrap(), "jwt-1");
        assert_eq!(b.unwrap(), "jwt-1");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_is_retried_on_next_call() {
        let refresher = Arc::new(CountingRefresher {
            fail: true,
            ..Default::default()
        });
        let tokens = provider(refresher.clone());

        assert!(tokens.get_token().await.is_err());
        assert!(tokens.get_token().await.is_err());
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_a_refresh() {
        let refresher = Arc::new(CountingRefresher::default());
        let tokens = provider(refresher.clone());

        tokens.get_token().await.unwrap();
        tokens.invalidate().await;
        assert_eq!(tokens.get_token().await.unwrap(), "jwt-2");
    }

    #[tokio::test]
    async fn oauth_refresher_posts_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refresh"))
            .and(query_param("token", "my-refresh"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"AccessToken": "jwt"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let refresher = OAuthRefresher::new(reqwest::Client::new(), server.uri());
        assert_eq!(refresher.refresh("my-refresh").await.unwrap(), "jwt");
    }

    #[tokio::test]
    async fn oauth_refresher_maps_rejection_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refresh"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
            .mount(&server)
            .await;

        let refresher = OAuthRefresher::new(reqwest::Client::new(), server.uri());
        let err = refresher.refresh("stale").await.unwrap_err();
        let AlorError::Api(api) = err else {
            panic!("expected api error, got {err:?}");
        };
        assert_eq!(api.status, 401);
        assert_eq!(api.message, "token revoked");
    }
}
