//! In-memory session oracle.
//!
//! A scriptable provider for tests and multi-context simulations: one oracle
//! instance models the provider as seen from one context, with knobs for the
//! situations the relay must survive (no session, pending confirmation,
//! install failures, provider outages).

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{OracleError, SessionOracle};
use crate::types::{ConfirmedStatus, SessionSnapshot};

#[derive(Default)]
struct OracleInner {
    user: Option<ScriptedUser>,
    session: SessionSnapshot,
    has_session: bool,
    fail_install: Option<String>,
    fail_status: Option<String>,
}

struct ScriptedUser {
    user_id: String,
    email: String,
}

/// Controllable in-memory [`SessionOracle`].
#[derive(Default)]
pub struct InMemorySessionOracle {
    inner: Mutex<OracleInner>,
}

impl InMemorySessionOracle {
    /// An oracle with no user and no session.
    pub fn new() -> Self {
        Self::default()
    }

    /// An oracle with a signed-in user whose email is not confirmed yet.
    pub fn with_unconfirmed_user(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        let oracle = Self::new();
        {
            let mut inner = oracle.inner.lock();
            inner.user = Some(ScriptedUser {
                user_id: user_id.into(),
                email: email.into(),
            });
            inner.has_session = true;
        }
        oracle
    }

    /// An oracle with a signed-in, confirmed user.
    pub fn with_confirmed_user(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        let oracle = Self::with_unconfirmed_user(user_id, email);
        oracle.confirm();
        oracle
    }

    /// Mark the user's email as confirmed, as the provider would after the
    /// confirmation link is followed.
    pub fn confirm(&self) {
        self.inner.lock().session.email_confirmed_at = Some(Utc::now());
    }

    /// Drop the session but keep the user registered (cookie expired,
    /// signed out elsewhere).
    pub fn detach_session(&self) {
        let mut inner = self.inner.lock();
        inner.has_session = false;
        inner.session.access_token = None;
        inner.session.refresh_token = None;
    }

    /// Fail the next `install_session` call with the given message.
    pub fn fail_next_install(&self, message: impl Into<String>) {
        self.inner.lock().fail_install = Some(message.into());
    }

    /// Fail the next `confirmed_status` call with a provider error.
    pub fn fail_next_status(&self, message: impl Into<String>) {
        self.inner.lock().fail_status = Some(message.into());
    }

    /// Current session material (test assertions).
    pub fn session_snapshot(&self) -> SessionSnapshot {
        self.inner.lock().session.clone()
    }
}

#[async_trait]
impl SessionOracle for InMemorySessionOracle {
    async fn confirmed_status(&self) -> Result<ConfirmedStatus, OracleError> {
        let mut inner = self.inner.lock();
        if let Some(message) = inner.fail_status.take() {
            return Err(OracleError::Provider(message));
        }
        if !inner.has_session {
            return Err(OracleError::NoSession);
        }
        let Some(user) = inner.user.as_ref() else {
            return Err(OracleError::NoSession);
        };
        Ok(ConfirmedStatus {
            confirmed: inner.session.is_confirmed(),
            email: Some(user.email.clone()),
            user_id: Some(user.user_id.clone()),
        })
    }

    async fn install_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), OracleError> {
        let mut inner = self.inner.lock();
        if let Some(message) = inner.fail_install.take() {
            return Err(OracleError::InstallRejected(message));
        }
        inner.session.access_token = Some(access_token.to_string());
        inner.session.refresh_token = Some(refresh_token.to_string());
        inner.has_session = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_session_is_an_error() {
        let oracle = InMemorySessionOracle::new();
        assert!(matches!(
            oracle.confirmed_status().await,
            Err(OracleError::NoSession)
        ));
    }

    #[tokio::test]
    async fn test_pending_user_is_not_an_error() {
        let oracle = InMemorySessionOracle::with_unconfirmed_user("u1", "a@b.com");
        let status = oracle.confirmed_status().await.unwrap();

        assert!(!status.confirmed);
        assert_eq!(status.email.as_deref(), Some("a@b.com"));
        assert_eq!(status.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_confirm_flips_status() {
        let oracle = InMemorySessionOracle::with_unconfirmed_user("u1", "a@b.com");
        oracle.confirm();

        assert!(oracle.confirmed_status().await.unwrap().confirmed);
    }

    #[tokio::test]
    async fn test_install_session_stores_tokens() {
        let oracle = InMemorySessionOracle::with_unconfirmed_user("u1", "a@b.com");
        oracle.detach_session();
        assert!(matches!(
            oracle.confirmed_status().await,
            Err(OracleError::NoSession)
        ));

        oracle.install_session("aaa", "rrr").await.unwrap();
        assert!(oracle.confirmed_status().await.is_ok());

        let snapshot = oracle.session_snapshot();
        assert_eq!(snapshot.access_token.as_deref(), Some("aaa"));
        assert_eq!(snapshot.refresh_token.as_deref(), Some("rrr"));
    }

    #[tokio::test]
    async fn test_injected_failures_fire_once() {
        let oracle = InMemorySessionOracle::with_confirmed_user("u1", "a@b.com");

        oracle.fail_next_status("boom");
        assert!(matches!(
            oracle.confirmed_status().await,
            Err(OracleError::Provider(_))
        ));
        assert!(oracle.confirmed_status().await.is_ok());

        oracle.fail_next_install("nope");
        assert!(matches!(
            oracle.install_session("a", "r").await,
            Err(OracleError::InstallRejected(_))
        ));
        assert!(oracle.install_session("a", "r").await.is_ok());
    }
}
