//! Context identity types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::location::normalize_path;
use crate::CONFIRMATION_ROUTE;

/// Unique identifier for one browser context (tab/window) in the process.
///
/// Wraps a UUID and implements `Ord` for deterministic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Create a ContextId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh random ContextId.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ContextId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Explicit "who am I" capability for a context.
///
/// Constructed once from the context's location and injected into every
/// component that needs it, instead of each call site re-inferring identity
/// from the URL. The path is what decides publisher-context status: the
/// storage mechanism can legitimately echo a write back to the writer in
/// some runtimes, so channel-level sender filtering alone is not a safe
/// self-guard for the fallback transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextIdentity {
    /// Unique id of this context.
    pub id: ContextId,
    /// Normalized location path of this context.
    path: String,
}

impl ContextIdentity {
    /// Create an identity for a context at the given location path.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            id: ContextId::random(),
            path: normalize_path(path.as_ref()),
        }
    }

    /// Create an identity with an explicit id (tests, handoffs).
    pub fn with_id(id: ContextId, path: impl AsRef<str>) -> Self {
        Self {
            id,
            path: normalize_path(path.as_ref()),
        }
    }

    /// The normalized location path of this context.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Is this context the confirmation page itself?
    ///
    /// The confirmation page is the publisher: it must never react to a
    /// `ConfirmationSignal`, including its own write echoed by the store.
    pub fn is_confirmation_context(&self) -> bool {
        self.path == normalize_path(CONFIRMATION_ROUTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_context_detection() {
        assert!(ContextIdentity::new("/confirm-email").is_confirmation_context());
        assert!(!ContextIdentity::new("/dashboard").is_confirmation_context());
        assert!(!ContextIdentity::new("/").is_confirmation_context());
    }

    #[test]
    fn test_detection_survives_sloppy_paths() {
        // Trailing slashes and duplicate separators come in from real URLs.
        assert!(ContextIdentity::new("/confirm-email/").is_confirmation_context());
        assert!(ContextIdentity::new("//confirm-email").is_confirmation_context());
        assert!(!ContextIdentity::new("/confirm-email/extra").is_confirmation_context());
    }

    #[test]
    fn test_context_ids_are_unique() {
        assert_ne!(ContextId::random(), ContextId::random());
    }
}
