//! Persisted key/value store with cross-context change notifications.
//!
//! Models the durable, origin-scoped store the fallback transport rides on:
//! writes are visible to every context, change notifications fire in
//! contexts *other* than the writer, and a late subscriber gets no replay of
//! history. Some runtimes echo a change notification back to the writer —
//! the in-memory backend can reproduce that, which is why consumers guard
//! against self-processing by location path, never by notification origin.

pub mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::types::ContextId;

/// Error type for store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The backing store rejected or lost the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A change notification for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    /// The key that changed.
    pub key: String,
    /// New value, or `None` when the key was removed.
    pub value: Option<String>,
    /// The context that performed the write.
    pub writer: ContextId,
}

/// Trait for persisted key/value backends.
///
/// All values are JSON strings; interpretation is the caller's business.
/// Implementations must deliver change notifications to other contexts and
/// must not replay history to late subscribers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key, notifying other contexts.
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key, notifying other contexts.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Subscribe to change notifications, starting now.
    fn watch(&self) -> StoreWatch;
}

/// Stream of [`StoreEvent`]s as observed by one context.
///
/// Events written by the observing context itself are filtered out unless the
/// backend is in echo mode.
pub struct StoreWatch {
    rx: broadcast::Receiver<StoreEvent>,
    observer: ContextId,
    echo_local: bool,
}

impl StoreWatch {
    /// Wrap a raw notification receiver for one observing context.
    pub fn new(rx: broadcast::Receiver<StoreEvent>, observer: ContextId, echo_local: bool) -> Self {
        Self {
            rx,
            observer,
            echo_local,
        }
    }

    /// Next change event, or `None` once the store is gone.
    ///
    /// Lagged notifications are skipped rather than surfaced: the fallback
    /// transport re-reads the key before acting, so a dropped notification
    /// costs at most one poll interval.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if event.writer == self.observer && !self.echo_local {
                        continue;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "store watch lagged, dropping notifications");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

pub use memory::{MemoryStoreHandle, SharedStore};
