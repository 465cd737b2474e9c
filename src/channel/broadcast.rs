//! Broadcast-primitive transport.
//!
//! Models the native in-memory broadcast primitive: process-wide channels
//! keyed by logical name, delivery to every *other* context subscribed at
//! publish time, no durability, no replay. A bus can be constructed
//! unsupported, which is how runtimes without the primitive are represented;
//! callers then fall back to the persisted-key transport.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::{ChannelError, SignalChannel, SignalSubscription};
use crate::types::{ConfirmationSignal, ContextId, ContextIdentity};

/// Per-channel fan-out depth. Confirmation traffic is a few events per
/// channel lifetime; lagging receivers just drop, like the real primitive.
const FANOUT_CAPACITY: usize = 16;

/// Subscription buffer depth between the forwarder task and the consumer.
const DELIVERY_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
struct Envelope {
    sender: ContextId,
    signal: ConfirmationSignal,
}

struct BusInner {
    channels: Mutex<HashMap<String, broadcast::Sender<Envelope>>>,
    supported: bool,
}

/// Process-wide registry of named broadcast channels.
///
/// One bus models the runtime shared by all same-origin contexts. Channels
/// are created on first use and live for the life of the bus.
#[derive(Clone)]
pub struct BroadcastBus {
    inner: Arc<BusInner>,
}

impl BroadcastBus {
    /// A bus with the broadcast primitive available.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// A bus modeling a runtime without the broadcast primitive.
    pub fn unsupported() -> Self {
        Self::build(false)
    }

    fn build(supported: bool) -> Self {
        Self {
            inner: Arc::new(BusInner {
                channels: Mutex::new(HashMap::new()),
                supported,
            }),
        }
    }

    /// Whether the primitive is available on this bus.
    pub fn is_supported(&self) -> bool {
        self.inner.supported
    }

    /// Open the named channel for one context.
    ///
    /// Returns `None` when the primitive is unsupported — the caller must
    /// fall back to the persisted-key transport.
    pub fn channel(&self, name: &str, identity: &ContextIdentity) -> Option<BroadcastSignalChannel> {
        if !self.inner.supported {
            return None;
        }
        let tx = self
            .inner
            .channels
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(FANOUT_CAPACITY).0)
            .clone();
        Some(BroadcastSignalChannel {
            tx,
            context: identity.id,
        })
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One context's endpoint on a named broadcast channel.
#[derive(Clone)]
pub struct BroadcastSignalChannel {
    tx: broadcast::Sender<Envelope>,
    context: ContextId,
}

#[async_trait]
impl SignalChannel for BroadcastSignalChannel {
    async fn publish(&self, signal: &ConfirmationSignal) -> Result<(), ChannelError> {
        // No subscribers means the event is silently dropped; that is the
        // primitive's contract, not an error. The poll backstop covers it.
        let _ = self.tx.send(Envelope {
            sender: self.context,
            signal: signal.clone(),
        });
        Ok(())
    }

    fn subscribe(&self) -> Result<SignalSubscription, ChannelError> {
        let mut rx = self.tx.subscribe();
        let own_context = self.context;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let (out_tx, out_rx) = mpsc::channel(DELIVERY_CAPACITY);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(envelope) => {
                            // Delivery is to all *other* contexts.
                            if envelope.sender == own_context {
                                continue;
                            }
                            if out_tx.send(envelope.signal).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "broadcast subscription lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(SignalSubscription::new(out_rx, cancel, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_CHANNEL_NAME;

    fn identity(path: &str) -> ContextIdentity {
        ContextIdentity::new(path)
    }

    #[tokio::test]
    async fn test_other_context_receives() {
        let bus = BroadcastBus::new();
        let publisher = bus
            .channel(DEFAULT_CHANNEL_NAME, &identity("/confirm-email"))
            .unwrap();
        let listener = bus
            .channel(DEFAULT_CHANNEL_NAME, &identity("/dashboard"))
            .unwrap();

        let mut sub = listener.subscribe().unwrap();
        let signal = ConfirmationSignal::new("u1", "a@b.com");
        publisher.publish(&signal).await.unwrap();

        let received = sub.recv().await.unwrap();
        assert_eq!(received, signal);
    }

    #[tokio::test]
    async fn test_publisher_does_not_hear_itself() {
        let bus = BroadcastBus::new();
        let publisher = bus
            .channel(DEFAULT_CHANNEL_NAME, &identity("/confirm-email"))
            .unwrap();
        let listener = bus
            .channel(DEFAULT_CHANNEL_NAME, &identity("/dashboard"))
            .unwrap();

        let mut own_sub = publisher.subscribe().unwrap();
        let mut other_sub = listener.subscribe().unwrap();

        publisher.publish(&ConfirmationSignal::new("u1", "a@b.com")).await.unwrap();
        // Publish from the listener afterwards; if the publisher's own event
        // had been delivered to it, it would arrive first.
        listener.publish(&ConfirmationSignal::new("u2", "c@d.com")).await.unwrap();

        let at_publisher = own_sub.recv().await.unwrap();
        assert_eq!(at_publisher.user_id, "u2", "publisher must only hear others");

        let at_listener = other_sub.recv().await.unwrap();
        assert_eq!(at_listener.user_id, "u1");
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_event() {
        let bus = BroadcastBus::new();
        let publisher = bus
            .channel(DEFAULT_CHANNEL_NAME, &identity("/confirm-email"))
            .unwrap();
        let listener = bus
            .channel(DEFAULT_CHANNEL_NAME, &identity("/dashboard"))
            .unwrap();

        publisher.publish(&ConfirmationSignal::new("u1", "a@b.com")).await.unwrap();

        // Subscribed only after the publish: no replay.
        let mut sub = listener.subscribe().unwrap();
        publisher.publish(&ConfirmationSignal::new("u2", "c@d.com")).await.unwrap();

        let received = sub.recv().await.unwrap();
        assert_eq!(received.user_id, "u2");
    }

    #[tokio::test]
    async fn test_unsupported_bus_yields_no_channel() {
        let bus = BroadcastBus::unsupported();
        assert!(!bus.is_supported());
        assert!(bus.channel(DEFAULT_CHANNEL_NAME, &identity("/dashboard")).is_none());
    }

    #[tokio::test]
    async fn test_channels_are_isolated_by_name() {
        let bus = BroadcastBus::new();
        let publisher = bus.channel("channel-a", &identity("/confirm-email")).unwrap();
        let listener_b = bus.channel("channel-b", &identity("/dashboard")).unwrap();
        let listener_a = bus.channel("channel-a", &identity("/profile")).unwrap();

        let mut sub_b = listener_b.subscribe().unwrap();
        let mut sub_a = listener_a.subscribe().unwrap();

        publisher.publish(&ConfirmationSignal::new("u1", "a@b.com")).await.unwrap();

        assert_eq!(sub_a.recv().await.unwrap().user_id, "u1");
        // Nothing may arrive on the other channel.
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), sub_b.recv())
                .await
                .is_err()
        );
    }
}
