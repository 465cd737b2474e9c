//! Identity-provider adapter.
//!
//! The oracle is the only component that touches raw session material; every
//! other part of the relay sees derived booleans. Instances are injected
//! explicitly wherever they are needed — there is no module-level client —
//! so tests and embedders can substitute their own.

pub mod memory;
pub mod resend;

use async_trait::async_trait;

use crate::types::ConfirmedStatus;

/// Error type for oracle operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    /// No user session exists.
    #[error("no user session")]
    NoSession,
    /// The provider rejected a session install.
    #[error("session install rejected: {0}")]
    InstallRejected(String),
    /// The provider could not be reached or answered garbage.
    #[error("identity provider error: {0}")]
    Provider(String),
}

/// Adapter over the identity/session provider.
///
/// Both sides of the relay ask the same two questions: "is this user's email
/// confirmed right now" and "install these tokens into a session". An
/// existing-but-unconfirmed user is a successful answer, not an error;
/// [`OracleError::NoSession`] means there is no user at all.
#[async_trait]
pub trait SessionOracle: Send + Sync {
    /// Ask the provider whether the current user's email is confirmed.
    async fn confirmed_status(&self) -> Result<ConfirmedStatus, OracleError>;

    /// Install tokens extracted from a confirmation URL into a session.
    async fn install_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), OracleError>;
}

pub use memory::InMemorySessionOracle;
