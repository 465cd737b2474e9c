//! Core types for the confirmation relay.

pub mod signal;
pub mod context;
pub mod location;
pub mod session;
pub mod state;

pub use signal::{ConfirmationSignal, AcknowledgmentSignal, RedirectFlag};
pub use context::{ContextId, ContextIdentity};
pub use location::{LocationParts, ExtractedTokens, extract_tokens, normalize_path};
pub use session::{SessionSnapshot, ConfirmedStatus};
pub use state::ConfirmationState;
