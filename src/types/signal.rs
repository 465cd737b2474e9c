//! Signal payloads that cross the context boundary.
//!
//! All three payloads round-trip through JSON with their literal field names
//! (`timestamp`, `userId`, `email`, `processedBy`) — that spelling is the
//! wire contract between contexts, including contexts running older builds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::ContextId;

/// Announcement that an email address was just confirmed.
///
/// Produced once per successful confirmation in the confirmation context and
/// published at-least-once: the transport does not distinguish retries from
/// duplicates, so consumers must treat repeated signals as one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationSignal {
    /// When the confirmation was observed.
    pub timestamp: DateTime<Utc>,
    /// Identity-provider user id of the confirmed account.
    pub user_id: String,
    /// The confirmed email address.
    pub email: String,
}

impl ConfirmationSignal {
    /// Create a signal stamped with the current time.
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: user_id.into(),
            email: email.into(),
        }
    }
}

/// Receipt written by the origin context after it consumed a
/// [`ConfirmationSignal`].
///
/// Only the store-backed transport uses this, as a weak liveness probe: the
/// publisher checks for it to decide whether the origin context is still
/// alive and saw the signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgmentSignal {
    /// When the signal was consumed.
    pub timestamp: DateTime<Utc>,
    /// Which context consumed it.
    pub processed_by: ContextId,
}

impl AcknowledgmentSignal {
    /// Create an acknowledgment stamped with the current time.
    pub fn new(processed_by: ContextId) -> Self {
        Self {
            timestamp: Utc::now(),
            processed_by,
        }
    }
}

/// "Confirmed, please sign in" flag.
///
/// Persisted by a confirmation context that could neither close itself nor
/// find a live origin context; the sign-in page reads it to greet the user
/// with the right message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectFlag {
    /// When the stranded confirmation was detected.
    pub timestamp: DateTime<Utc>,
    /// The confirmed email address.
    pub email: String,
}

impl RedirectFlag {
    /// Create a flag stamped with the current time.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            email: email.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_signal_wire_field_names() {
        let signal = ConfirmationSignal::new("u1", "a@b.com");
        let json = serde_json::to_string(&signal).unwrap();

        assert!(json.contains("\"timestamp\""), "literal timestamp field: {json}");
        assert!(json.contains("\"userId\":\"u1\""), "literal userId field: {json}");
        assert!(json.contains("\"email\":\"a@b.com\""), "literal email field: {json}");
    }

    #[test]
    fn test_confirmation_signal_round_trip() {
        let signal = ConfirmationSignal::new("user-42", "someone@example.com");
        let json = serde_json::to_string(&signal).unwrap();
        let back: ConfirmationSignal = serde_json::from_str(&json).unwrap();

        assert_eq!(back, signal);
    }

    #[test]
    fn test_acknowledgment_wire_field_names() {
        let ack = AcknowledgmentSignal::new(ContextId::random());
        let json = serde_json::to_string(&ack).unwrap();

        assert!(json.contains("\"processedBy\""), "literal processedBy field: {json}");

        let back: AcknowledgmentSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ack);
    }

    #[test]
    fn test_redirect_flag_round_trip() {
        let flag = RedirectFlag::new("a@b.com");
        let json = serde_json::to_string(&flag).unwrap();
        let back: RedirectFlag = serde_json::from_str(&json).unwrap();

        assert_eq!(back, flag);
    }

    #[test]
    fn test_malformed_signal_is_rejected() {
        let err = serde_json::from_str::<ConfirmationSignal>("{\"userId\":1}");
        assert!(err.is_err());
    }
}
