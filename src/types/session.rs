//! Session-derived types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw session material held by the identity provider.
///
/// Owned exclusively by the [`SessionOracle`](crate::session::SessionOracle);
/// every other component reads derived booleans only, never raw tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Access token, if a session is installed.
    pub access_token: Option<String>,
    /// Refresh token, if a session is installed.
    pub refresh_token: Option<String>,
    /// When the provider recorded the email as confirmed, if ever.
    pub email_confirmed_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// Whether the email is confirmed.
    pub fn is_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// Answer to "is this user's email confirmed right now".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedStatus {
    /// Whether the email is confirmed.
    pub confirmed: bool,
    /// Email address on the account, when known.
    pub email: Option<String>,
    /// Identity-provider user id, when known.
    pub user_id: Option<String>,
}

impl ConfirmedStatus {
    /// A confirmed user.
    pub fn confirmed(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            confirmed: true,
            email: Some(email.into()),
            user_id: Some(user_id.into()),
        }
    }

    /// A user that exists but has not confirmed yet.
    pub fn pending(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            confirmed: false,
            email: Some(email.into()),
            user_id: Some(user_id.into()),
        }
    }
}
