//! In-memory store backend.
//!
//! One [`SharedStore`] models the origin-scoped store of a browser profile;
//! each simulated context derives its own [`MemoryStoreHandle`] from it.
//! Used by the test suites and by embedders that simulate multi-context
//! scenarios in one process.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{KeyValueStore, StoreError, StoreEvent, StoreWatch};
use crate::types::{ContextId, ContextIdentity};

/// Notification buffer depth. Signal traffic is a handful of keys; anything
/// deeper than this means a stuck consumer, and lagging is recoverable.
const NOTIFY_CAPACITY: usize = 64;

struct SharedInner {
    map: Mutex<BTreeMap<String, String>>,
    notify: broadcast::Sender<StoreEvent>,
    echo_local: bool,
}

/// Process-wide in-memory key/value store shared by all simulated contexts.
///
/// Uses a BTreeMap for deterministic iteration order in debugging dumps.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<SharedInner>,
}

impl SharedStore {
    /// Create an empty store that does not echo writes back to the writer.
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Create an empty store that echoes change notifications back to the
    /// writing context, as some runtimes do. Consumers must stay correct
    /// under this mode — it is what forces the path-based publisher guard.
    pub fn with_echo() -> Self {
        Self::build(true)
    }

    fn build(echo_local: bool) -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            inner: Arc::new(SharedInner {
                map: Mutex::new(BTreeMap::new()),
                notify,
                echo_local,
            }),
        }
    }

    /// Derive the store handle for one context.
    pub fn handle(&self, identity: &ContextIdentity) -> MemoryStoreHandle {
        MemoryStoreHandle {
            inner: Arc::clone(&self.inner),
            context: identity.id,
        }
    }

    /// Read a key directly, outside any context (test assertions).
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.map.lock().get(key).cloned()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.inner.map.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.map.lock().is_empty()
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One context's view of a [`SharedStore`].
#[derive(Clone)]
pub struct MemoryStoreHandle {
    inner: Arc<SharedInner>,
    context: ContextId,
}

impl MemoryStoreHandle {
    fn publish_event(&self, key: &str, value: Option<String>) {
        // No receivers is fine: nobody was listening, the event is lost,
        // exactly like the real primitive.
        let _ = self.inner.notify.send(StoreEvent {
            key: key.to_string(),
            value,
            writer: self.context,
        });
    }
}

#[async_trait]
impl KeyValueStore for MemoryStoreHandle {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.map.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner
            .map
            .lock()
            .insert(key.to_string(), value.to_string());
        self.publish_event(key, Some(value.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let removed = self.inner.map.lock().remove(key);
        if removed.is_some() {
            self.publish_event(key, None);
        }
        Ok(())
    }

    fn watch(&self) -> StoreWatch {
        StoreWatch::new(
            self.inner.notify.subscribe(),
            self.context,
            self.inner.echo_local,
        )
    }
}
