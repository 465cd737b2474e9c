//! Relay configuration.
//!
//! Every delay in the protocol is tunable. The defaults reflect the current
//! deployment; [`RelayConfig::legacy`] reproduces the cadence of older
//! deployments that polled every 2 seconds. Both cadences are supported
//! configurations, not just historical artifacts — some installations still
//! run the legacy one.

use std::time::Duration;

use crate::DEFAULT_CHANNEL_NAME;

/// Timing and identity configuration for both sides of the relay.
///
/// ## Parameters
///
/// - `channel_name`: logical channel shared by both transports
/// - `token_settle`: wait after installing URL tokens before checking
///   confirmation, so the provider's local state is consistent
/// - `sessionless_settle`: wait before checking confirmation when no tokens
///   were on the URL (a cookie-based exchange is slower to observe)
/// - `poll_interval`: origin-side backstop poll cadence
/// - `success_hold`: how long the confirmation tab shows success before its
///   first close attempt
/// - `ack_probe_delay`: wait after a failed close before probing for an
///   acknowledgment
/// - `close_retry_delay`: wait before retrying close once acknowledged
/// - `fallback_settle`: wait before the destructive read on the fallback
///   transport, so the publisher can finish its remaining writes
/// - `resend_cooldown`: minimum gap between confirmation resend requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Logical channel name shared by both transport strategies.
    pub channel_name: String,
    /// Settle delay after installing tokens from the URL.
    pub token_settle: Duration,
    /// Settle delay when no tokens were present on the URL.
    pub sessionless_settle: Duration,
    /// Origin-side backstop poll interval.
    pub poll_interval: Duration,
    /// Visible success hold before the first close attempt.
    pub success_hold: Duration,
    /// Delay between a failed close and the acknowledgment probe.
    pub ack_probe_delay: Duration,
    /// Delay before retrying close after an acknowledgment was found.
    pub close_retry_delay: Duration,
    /// Settle delay before the fallback transport's destructive read.
    pub fallback_settle: Duration,
    /// Minimum gap between resend requests.
    pub resend_cooldown: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            token_settle: Duration::from_millis(500),
            sessionless_settle: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(5000),
            success_hold: Duration::from_millis(1500),
            ack_probe_delay: Duration::from_millis(1000),
            close_retry_delay: Duration::from_millis(500),
            fallback_settle: Duration::from_millis(250),
            resend_cooldown: Duration::from_secs(60),
        }
    }
}

impl RelayConfig {
    /// Configuration matching legacy deployments (2 s poll cadence).
    pub fn legacy() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = RelayConfig::default();

        assert_eq!(config.token_settle, Duration::from_millis(500));
        assert_eq!(config.sessionless_settle, Duration::from_millis(1000));
        assert_eq!(config.poll_interval, Duration::from_millis(5000));
        assert_eq!(config.ack_probe_delay, Duration::from_millis(1000));
        assert_eq!(config.close_retry_delay, Duration::from_millis(500));
        assert_eq!(config.resend_cooldown, Duration::from_secs(60));
        assert_eq!(config.channel_name, DEFAULT_CHANNEL_NAME);
    }

    #[test]
    fn test_legacy_only_changes_poll_cadence() {
        let legacy = RelayConfig::legacy();
        let current = RelayConfig::default();

        assert_eq!(legacy.poll_interval, Duration::from_millis(2000));
        assert_eq!(legacy.token_settle, current.token_settle);
        assert_eq!(legacy.resend_cooldown, current.resend_cooldown);
    }
}
