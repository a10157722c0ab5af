use std::sync::Arc;

use crate::auth::{GoTrueAuthenticator, Session};
use crate::db::Backend;
use crate::error::DeskflowResult;
use crate::rate_limit::{Access, RateLimiter};
use crate::remote_client::RemoteClient;
use crate::settings::Settings;

/// Everything an operation needs: the backend it talks to, the shared rate
/// limiter, and the settings. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub limiter: Arc<RateLimiter>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, limiter: Arc<RateLimiter>, settings: Arc<Settings>) -> Self {
        Self { backend, limiter, settings }
    }

    /// Limiter sized from `settings`.
    pub fn limiter_for(settings: &Settings) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(settings.rate_limit_read, settings.rate_limit_write))
    }

    /// Remote backend acting as the owner of `refresh_token`.
    pub fn connect(settings: Arc<Settings>, limiter: Arc<RateLimiter>, refresh_token: &str) -> DeskflowResult<Self> {
        let authenticator = GoTrueAuthenticator::new(
            &settings.supabase_url,
            &settings.supabase_anon_key,
            settings.http_timeout(),
        )?;
        let session = Arc::new(Session::new(Arc::new(authenticator), refresh_token));
        let client = RemoteClient::new(&settings, session)?;
        Ok(Self::new(Arc::new(client), limiter, settings))
    }

    /// Authenticate once up front so a bad token fails before serving.
    pub async fn verify_session(&self) -> DeskflowResult<String> {
        let user_id = self.backend.current_user_id().await?;
        tracing::info!(user_id = %user_id, "Authenticated");
        Ok(user_id)
    }

    pub(crate) fn guard(&self, access: Access) -> DeskflowResult<()> {
        self.limiter.check(access)
    }

    pub(crate) fn db(&self) -> &dyn Backend {
        self.backend.as_ref()
    }
}

#[cfg(test)]
impl AppState {
    /// State over an in-memory backend with generous limits.
    pub(crate) fn in_memory(backend: Arc<crate::db::memory::MemoryBackend>) -> Self {
        Self::new(backend, Arc::new(RateLimiter::new(1_000, 1_000)), Arc::new(Settings::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryBackend, TEST_USER_ID};
    use crate::error::DeskflowError;

    #[tokio::test]
    async fn test_verify_session() {
        let state = AppState::in_memory(Arc::new(MemoryBackend::new()));
        assert_eq!(state.verify_session().await.unwrap(), TEST_USER_ID);

        let revoked = AppState::in_memory(Arc::new(MemoryBackend::with_rejected_session()));
        assert!(matches!(revoked.verify_session().await, Err(DeskflowError::Authentication(_))));
    }
}
