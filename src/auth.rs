//! Refresh-token authentication against the backend's auth service.
//!
//! A `Session` caches one access token and refreshes it lazily, 60 seconds
//! before it expires. Callers share it as `Arc<Session>`; concurrent callers
//! wait on the same lock so one expiry causes one refresh.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{DeskflowError, DeskflowResult};
use crate::logging::token_prefix;
use crate::utils::safe_truncate;

/// Seconds before expiry at which a cached token is considered stale.
pub const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub expires_at: i64,
}

pub trait Authenticator: Send + Sync {
    fn authenticate<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, DeskflowResult<AuthenticatedUser>>;
}

/// GoTrue refresh-token grant (`POST /auth/v1/token?grant_type=refresh_token`).
pub struct GoTrueAuthenticator {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl GoTrueAuthenticator {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> DeskflowResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> DeskflowResult<AuthenticatedUser> {
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| DeskflowError::Authentication(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeskflowError::Authentication(format!(
                "token refresh returned {}: {}",
                status,
                safe_truncate(&body, 200)
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| DeskflowError::Authentication(format!("bad token response: {}", e)))?;
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| chrono::Utc::now().timestamp() + secs))
            .unwrap_or(0);

        Ok(AuthenticatedUser {
            user_id: token.user.id,
            email: token.user.email.unwrap_or_default(),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
        })
    }
}

impl Authenticator for GoTrueAuthenticator {
    fn authenticate<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, DeskflowResult<AuthenticatedUser>> {
        self.refresh(refresh_token).boxed()
    }
}

struct SessionState {
    refresh_token: String,
    current: Option<AuthenticatedUser>,
}

pub struct Session {
    authenticator: Arc<dyn Authenticator>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(authenticator: Arc<dyn Authenticator>, refresh_token: impl Into<String>) -> Self {
        Self {
            authenticator,
            state: Mutex::new(SessionState {
                refresh_token: refresh_token.into(),
                current: None,
            }),
        }
    }

    /// Current credentials, refreshing first when missing or close to expiry.
    pub async fn user(&self) -> DeskflowResult<AuthenticatedUser> {
        self.user_at(chrono::Utc::now().timestamp()).await
    }

    pub async fn user_at(&self, now: i64) -> DeskflowResult<AuthenticatedUser> {
        let mut state = self.state.lock().await;
        if let Some(user) = &state.current {
            if now < user.expires_at - REFRESH_MARGIN_SECS {
                return Ok(user.clone());
            }
        }
        self.refresh_locked(&mut state).await
    }

    /// Refresh unconditionally.
    pub async fn refresh(&self) -> DeskflowResult<AuthenticatedUser> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    async fn refresh_locked(&self, state: &mut SessionState) -> DeskflowResult<AuthenticatedUser> {
        info!("Refreshing authentication token");
        let user = match self.authenticator.authenticate(&state.refresh_token).await {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "Authentication failed");
                return Err(match e {
                    DeskflowError::Authentication(_) => e,
                    other => DeskflowError::Authentication(other.to_string()),
                });
            }
        };

        if user.refresh_token != state.refresh_token {
            warn!(
                prefix = %token_prefix(&user.refresh_token),
                "Refresh token was rotated; update the configured token"
            );
            state.refresh_token = user.refresh_token.clone();
        }
        info!(email = %user.email, "Authenticated");
        state.current = Some(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAuth {
        calls: AtomicUsize,
        rotate: bool,
        expires_at: i64,
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl CountingAuth {
        fn new(expires_at: i64, rotate: bool) -> Self {
            Self { calls: AtomicUsize::new(0), rotate, expires_at, seen: Default::default() }
        }
    }

    impl Authenticator for CountingAuth {
        fn authenticate<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, DeskflowResult<AuthenticatedUser>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen.lock().unwrap().push(refresh_token.to_string());
            let next = if self.rotate { format!("rt-{}", n) } else { refresh_token.to_string() };
            let user = AuthenticatedUser {
                user_id: "u1".into(),
                email: "a@b.c".into(),
                access_token: format!("at-{}", n),
                refresh_token: next,
                expires_at: self.expires_at,
            };
            async move { Ok(user) }.boxed()
        }
    }

    struct FailingAuth;

    impl Authenticator for FailingAuth {
        fn authenticate<'a>(&'a self, _refresh_token: &'a str) -> BoxFuture<'a, DeskflowResult<AuthenticatedUser>> {
            async { Err(DeskflowError::Backend("connection refused".into())) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_cached_until_margin() {
        let auth = Arc::new(CountingAuth::new(1_000, false));
        let session = Session::new(auth.clone(), "rt-0");

        assert_eq!(session.user_at(0).await.unwrap().access_token, "at-1");
        assert_eq!(session.user_at(939).await.unwrap().access_token, "at-1");
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);

        // inside the 60s margin
        assert_eq!(session.user_at(940).await.unwrap().access_token, "at-2");
        assert_eq!(auth.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rotated_token_is_used_next_time() {
        let auth = Arc::new(CountingAuth::new(0, true));
        let session = Session::new(auth.clone(), "rt-0");
        session.user_at(100).await.unwrap();
        session.user_at(100).await.unwrap();
        assert_eq!(*auth.seen.lock().unwrap(), vec!["rt-0".to_string(), "rt-1".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let auth = Arc::new(CountingAuth::new(10_000, false));
        let session = Arc::new(Session::new(auth.clone(), "rt"));
        let (a, b) = tokio::join!(session.user_at(0), session.user_at(0));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_authentication_error() {
        let session = Session::new(Arc::new(FailingAuth), "rt");
        let err = session.user().await.unwrap_err();
        assert!(matches!(err, DeskflowError::Authentication(_)));
    }
}
