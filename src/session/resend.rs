//! Confirmation resend.
//!
//! Every terminal error in the confirmation flow offers one recovery: ask
//! the backend to send a fresh confirmation email. Resends are rate-limited
//! client-side by a cooldown so an impatient user cannot hammer the
//! endpoint, and failures come back as inline messages, never as panics or
//! uncaught errors.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::RelayConfig;

/// Error type for resend operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResendError {
    /// The cooldown has not elapsed yet.
    #[error("resend is cooling down, retry in {retry_in:?}")]
    CoolingDown {
        /// Remaining wait before the next resend is allowed.
        retry_in: Duration,
    },
    /// The request never reached the backend.
    #[error("resend request failed: {0}")]
    Request(String),
    /// The backend refused the resend.
    #[error("resend rejected: {0}")]
    Rejected(String),
}

/// Sends a fresh confirmation email for an address.
#[async_trait]
pub trait ConfirmationResender: Send + Sync {
    /// Request a resend; returns the message to show inline.
    async fn resend(&self, email: &str) -> Result<String, ResendError>;
}

/// Client-side cooldown guard between resend requests.
pub struct ResendCooldown {
    cooldown: Duration,
    last: Mutex<Option<Instant>>,
}

impl ResendCooldown {
    /// Guard with an explicit cooldown.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: Mutex::new(None),
        }
    }

    /// Guard using the configured cooldown.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.resend_cooldown)
    }

    /// Begin a resend attempt, or report the remaining wait.
    ///
    /// On `Ok` the cooldown restarts immediately — a failed request still
    /// counts, matching how the UI disables its resend button.
    pub fn try_begin(&self) -> Result<(), Duration> {
        let mut last = self.last.lock();
        let now = Instant::now();
        if let Some(previous) = *last {
            let elapsed = now.duration_since(previous);
            if elapsed < self.cooldown {
                return Err(self.cooldown - elapsed);
            }
        }
        *last = Some(now);
        Ok(())
    }

    /// Remaining wait, if the guard is currently cooling down.
    pub fn remaining(&self) -> Option<Duration> {
        let last = self.last.lock();
        let previous = (*last)?;
        let elapsed = Instant::now().duration_since(previous);
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }
}

/// HTTP resend client for the REST collaborator endpoint.
///
/// POSTs `{"email": ...}` and relays the backend's message inline.
#[cfg(feature = "http")]
pub struct HttpResender {
    client: reqwest::Client,
    endpoint: String,
    cooldown: ResendCooldown,
}

#[cfg(feature = "http")]
impl HttpResender {
    /// Client for the given resend endpoint.
    pub fn new(endpoint: impl Into<String>, config: &RelayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            cooldown: ResendCooldown::from_config(config),
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl ConfirmationResender for HttpResender {
    async fn resend(&self, email: &str) -> Result<String, ResendError> {
        self.cooldown
            .try_begin()
            .map_err(|retry_in| ResendError::CoolingDown { retry_in })?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(|e| ResendError::Request(e.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message = body
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string);

        if status.is_success() {
            Ok(message.unwrap_or_else(|| "Confirmation email sent".to_string()))
        } else {
            Err(ResendError::Rejected(
                message.unwrap_or_else(|| format!("resend failed with status {status}")),
            ))
        }
    }
}
