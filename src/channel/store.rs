//! Persisted-key fallback transport.
//!
//! Used when the broadcast primitive is unsupported. `publish` writes the
//! signal JSON under a well-known key; a subscription watches that key and,
//! on receipt, performs a destructive read (delete-on-read) and writes an
//! acknowledgment back under a second key. The destructive read converts
//! at-least-once-with-duplicates delivery into effectively-once for a single
//! listening origin context, at the cost of losing the message when nobody
//! is listening — the interval poll backstop covers that case.
//!
//! At most one origin context is assumed active. With two, the destructive
//! read still prevents double-delivery of one signal; which listener owns
//! the acknowledgment is whichever consumed the key first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ChannelError, SignalChannel, SignalSubscription};
use crate::config::RelayConfig;
use crate::store::KeyValueStore;
use crate::types::{AcknowledgmentSignal, ConfirmationSignal, ContextIdentity};
use crate::{ACK_KEY, SIGNAL_KEY};

/// Subscription buffer depth between the watcher task and the consumer.
const DELIVERY_CAPACITY: usize = 8;

/// Signal transport over the persisted key/value store.
pub struct StoreSignalChannel {
    store: Arc<dyn KeyValueStore>,
    identity: ContextIdentity,
    settle: Duration,
}

impl StoreSignalChannel {
    /// Create the fallback transport for one context.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        identity: ContextIdentity,
        config: &RelayConfig,
    ) -> Self {
        Self {
            store,
            identity,
            settle: config.fallback_settle,
        }
    }
}

#[async_trait]
impl SignalChannel for StoreSignalChannel {
    async fn publish(&self, signal: &ConfirmationSignal) -> Result<(), ChannelError> {
        let json = serde_json::to_string(signal).map_err(|e| ChannelError::Encode(e.to_string()))?;
        self.store.put(SIGNAL_KEY, &json).await?;
        Ok(())
    }

    fn subscribe(&self) -> Result<SignalSubscription, ChannelError> {
        let store = Arc::clone(&self.store);
        let identity = self.identity.clone();
        let settle = self.settle;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let (out_tx, out_rx) = mpsc::channel(DELIVERY_CAPACITY);

        // Watch before the catch-up sweep so a write landing in between is
        // not lost.
        let mut watch = store.watch();

        let task = tokio::spawn(async move {
            // One catch-up sweep: recovers a poisoned key left behind by a
            // dead context and consumes a signal persisted before this
            // subscription existed.
            if consume_signal(&store, &identity, &out_tx).await.is_break() {
                return;
            }

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    event = watch.recv() => {
                        let Some(event) = event else { break };
                        if event.key != SIGNAL_KEY || event.value.is_none() {
                            continue;
                        }
                        // The confirmation page must never react to the
                        // signal key — including its own write echoed back
                        // by the storage mechanism.
                        if identity.is_confirmation_context() {
                            tracing::debug!("ignoring signal key change in confirmation context");
                            continue;
                        }
                        // Let the publisher finish any remaining writes
                        // before the destructive read.
                        tokio::select! {
                            _ = task_cancel.cancelled() => break,
                            _ = tokio::time::sleep(settle) => {}
                        }
                        if consume_signal(&store, &identity, &out_tx).await.is_break() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(SignalSubscription::new(out_rx, cancel, task))
    }
}

/// Outcome of one consume attempt: continue watching or stop the task.
enum Flow {
    Continue,
    Break,
}

impl Flow {
    fn is_break(&self) -> bool {
        matches!(self, Flow::Break)
    }
}

/// Destructively read the signal key, acknowledge, and deliver.
///
/// A missing key means another listener already consumed it. Malformed JSON
/// is deleted and logged so a corrupt key cannot permanently wedge the
/// listener; the next valid signal is still processed.
async fn consume_signal(
    store: &Arc<dyn KeyValueStore>,
    identity: &ContextIdentity,
    out_tx: &mpsc::Sender<ConfirmationSignal>,
) -> Flow {
    if identity.is_confirmation_context() {
        return Flow::Continue;
    }

    let raw = match store.get(SIGNAL_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return Flow::Continue,
        Err(e) => {
            tracing::warn!(error = %e, "signal key read failed");
            return Flow::Continue;
        }
    };

    let signal = match serde_json::from_str::<ConfirmationSignal>(&raw) {
        Ok(signal) => signal,
        Err(e) => {
            let err = ChannelError::MalformedSignal(e.to_string());
            tracing::warn!(error = %err, "clearing poisoned signal key");
            if let Err(e) = store.remove(SIGNAL_KEY).await {
                tracing::warn!(error = %e, "failed to clear poisoned signal key");
            }
            return Flow::Continue;
        }
    };

    // Delete before acknowledging so a second listener cannot double-process.
    if let Err(e) = store.remove(SIGNAL_KEY).await {
        tracing::warn!(error = %e, "signal key delete failed");
    }

    let ack = AcknowledgmentSignal::new(identity.id);
    match serde_json::to_string(&ack) {
        Ok(json) => {
            if let Err(e) = store.put(ACK_KEY, &json).await {
                tracing::warn!(error = %e, "acknowledgment write failed");
            }
        }
        Err(e) => tracing::warn!(error = %e, "acknowledgment encoding failed"),
    }

    if out_tx.send(signal).await.is_err() {
        return Flow::Break;
    }
    Flow::Continue
}
