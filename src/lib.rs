//! # confirmation-relay
//!
//! Cross-context email-confirmation synchronization.
//!
//! When a user requests account confirmation, the confirmation link opens in
//! a *second* browser context, independent of the *origin* context where the
//! user is waiting. The two contexts share no memory and communicate only
//! through weak, best-effort primitives. This crate answers one question:
//!
//! > How does the origin context learn "the email was just confirmed"
//! > **exactly once**, no matter how the news arrives?
//!
//! ## Architecture
//!
//! ```text
//! ConfirmationTabController ─▶ SessionOracle (verify) ─▶ SignalChannel.publish
//!                                                              │
//!                                    broadcast bus ────────────┤
//!                                    persisted key store ──────┘
//!                                                              │
//! OriginTabListener ◀── SignalChannel.subscribe ◀──────────────┘
//!        │
//!        ├── interval poll of SessionOracle (backstop)
//!        ▼
//! ConfirmationStateMachine (single merge point, fires on_confirmed once)
//! ```
//!
//! ## Delivery Guarantees
//!
//! - Signals are published at-least-once; duplicates and replays are expected
//! - The state-machine guard makes the UI transition exactly-once per context
//! - The store-backed transport converts at-least-once into effectively-once
//!   for a single listening origin context via destructive reads
//! - Every subscription, timer, and poll is released deterministically when
//!   its owner is dropped

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod config;
pub mod store;
pub mod channel;
pub mod session;
pub mod machine;
pub mod controller;
pub mod listener;

// Re-exports
pub use types::{ConfirmationSignal, AcknowledgmentSignal, RedirectFlag};
pub use types::{ContextId, ContextIdentity};
pub use types::{LocationParts, ExtractedTokens, extract_tokens};
pub use types::{SessionSnapshot, ConfirmedStatus, ConfirmationState};
pub use config::RelayConfig;
pub use store::{KeyValueStore, StoreEvent, StoreError, SharedStore, MemoryStoreHandle};
pub use channel::{SignalChannel, SignalSubscription, ChannelError, connect};
pub use channel::{BroadcastBus, BroadcastSignalChannel, StoreSignalChannel};
pub use session::{SessionOracle, OracleError, InMemorySessionOracle};
pub use session::resend::{ConfirmationResender, ResendCooldown, ResendError};
pub use machine::ConfirmationStateMachine;
pub use controller::{ConfirmationTabController, TabState, TabEnvironment, ConfirmError};
pub use listener::{OriginTabListener, ListenerHandle};

#[cfg(feature = "http")]
pub use session::resend::HttpResender;

/// Logical channel name shared by both transport strategies.
/// Both contexts must use the same name to see each other.
pub const DEFAULT_CHANNEL_NAME: &str = "email-confirmation";

/// Persisted key carrying the `ConfirmationSignal` JSON (fallback transport).
pub const SIGNAL_KEY: &str = "email_confirmation_signal";

/// Persisted key carrying the `AcknowledgmentSignal` JSON written by the
/// origin context after it consumed a signal.
pub const ACK_KEY: &str = "email_confirmation_ack";

/// Persisted key carrying the "confirmed, please sign in" flag read by the
/// sign-in page when the origin context is gone.
pub const REDIRECT_FLAG_KEY: &str = "email_confirmation_pending_signin";

/// Fixed, well-known route of the confirmation page. Distinct from all
/// application routes so a context can reliably tell "I am the confirmation
/// tab" from its own location.
pub const CONFIRMATION_ROUTE: &str = "/confirm-email";

/// Route a stranded confirmation tab navigates to when no origin context
/// acknowledged its signal.
pub const SIGN_IN_ROUTE: &str = "/login";
