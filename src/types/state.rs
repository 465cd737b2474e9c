//! Per-context confirmation state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Confirmation state of one context.
///
/// Monotonic: once `Confirmed`, a context never reverts within its lifetime.
/// The state dies with the context — nothing here survives an unload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    /// No confirmation observed yet.
    Unconfirmed,
    /// Confirmation observed; terminal.
    Confirmed,
}

impl ConfirmationState {
    /// Whether this is the terminal state.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl Default for ConfirmationState {
    fn default() -> Self {
        Self::Unconfirmed
    }
}

impl fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfirmed => write!(f, "unconfirmed"),
            Self::Confirmed => write!(f, "confirmed"),
        }
    }
}
