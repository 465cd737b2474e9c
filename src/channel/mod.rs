//! Best-effort pub/sub between contexts.
//!
//! Two backing strategies behind one contract: a native broadcast primitive
//! (preferred) and a persisted key/value fallback with explicit
//! write/clear/acknowledge semantics. Both are identified by the same fixed
//! logical channel name, so a publisher on one strategy is only heard by
//! subscribers on the same strategy — transport selection must agree across
//! contexts, which [`connect`] guarantees by deriving it from bus support.

pub mod broadcast;
pub mod store;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::store::{KeyValueStore, StoreError};
use crate::types::{ConfirmationSignal, ContextIdentity};

pub use broadcast::{BroadcastBus, BroadcastSignalChannel};
pub use store::StoreSignalChannel;

/// Error type for channel operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    /// The broadcast primitive is not supported in this context.
    #[error("broadcast channel unsupported in this context")]
    Unsupported,
    /// A signal could not be encoded for the wire.
    #[error("signal encoding failed: {0}")]
    Encode(String),
    /// A persisted signal or acknowledgment key contained invalid JSON.
    /// Recovered locally (poisoned key deleted), never surfaced to the user.
    #[error("malformed persisted signal: {0}")]
    MalformedSignal(String),
    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Best-effort signal transport between contexts.
///
/// Delivery is at-least-once at best: duplicates, replays, and silent drops
/// are all possible. Consumers deduplicate through the state-machine guard,
/// never at the transport.
#[async_trait]
pub trait SignalChannel: Send + Sync {
    /// Publish a confirmation signal to other contexts.
    async fn publish(&self, signal: &ConfirmationSignal) -> Result<(), ChannelError>;

    /// Subscribe to signals from other contexts, starting now.
    ///
    /// A context that was not subscribed at publish time never receives that
    /// event on the broadcast strategy; the store strategy additionally
    /// consumes a signal that was already persisted when the subscription
    /// started.
    fn subscribe(&self) -> Result<SignalSubscription, ChannelError>;
}

/// A live subscription to a [`SignalChannel`].
///
/// Dropping the subscription releases its forwarder task and channel
/// registration deterministically — nothing keeps running once the owner is
/// gone.
pub struct SignalSubscription {
    rx: mpsc::Receiver<ConfirmationSignal>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SignalSubscription {
    pub(crate) fn new(
        rx: mpsc::Receiver<ConfirmationSignal>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self { rx, cancel, task }
    }

    /// Next inbound signal, or `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<ConfirmationSignal> {
        self.rx.recv().await
    }
}

impl Drop for SignalSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Select the transport for a context: broadcast when the primitive is
/// supported, the persisted-key fallback otherwise.
pub fn connect(
    bus: &BroadcastBus,
    identity: &ContextIdentity,
    store: Arc<dyn KeyValueStore>,
    config: &RelayConfig,
) -> Arc<dyn SignalChannel> {
    match bus.channel(&config.channel_name, identity) {
        Some(channel) => {
            tracing::info!(channel = %config.channel_name, transport = "broadcast", "channel connected");
            Arc::new(channel)
        }
        None => {
            tracing::info!(channel = %config.channel_name, transport = "store", "broadcast unsupported, falling back to persisted keys");
            Arc::new(StoreSignalChannel::new(store, identity.clone(), config))
        }
    }
}
