//! Table of live trigger listeners
//!
//! Polling and webhook triggers keep a listener running between runs. The
//! table owns those handles: re-registering or unregistering a trigger
//! stops the listener it replaces, and dropping the table stops them all.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Something that can be told to stop listening
pub trait ListenerHandle: Send + Sync {
    fn stop(&self);
}

impl ListenerHandle for CancellationToken {
    fn stop(&self) {
        self.cancel();
    }
}

impl ListenerHandle for tokio::task::AbortHandle {
    fn stop(&self) {
        self.abort();
    }
}

struct Listener<H> {
    handle: H,
    filter: Value,
}

/// Listener handles keyed by trigger id
pub struct ListenerTable<H: ListenerHandle> {
    listeners: RwLock<HashMap<String, Listener<H>>>,
}

impl<H: ListenerHandle> ListenerTable<H> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Register a listener; an existing listener for the id is stopped
    ///
    /// Returns whether a listener was replaced.
    pub fn register(&self, trigger_id: impl Into<String>, handle: H, filter: Value) -> bool {
        let trigger_id = trigger_id.into();
        let previous = self
            .listeners
            .write()
            .insert(trigger_id.clone(), Listener { handle, filter });

        match previous {
            Some(old) => {
                log::debug!("Replacing listener for trigger '{}'", trigger_id);
                old.handle.stop();
                true
            }
            None => {
                log::debug!("Registered listener for trigger '{}'", trigger_id);
                false
            }
        }
    }

    /// Stop and remove a listener
    pub fn unregister(&self, trigger_id: &str) -> bool {
        let removed = self.listeners.write().remove(trigger_id);
        match removed {
            Some(listener) => {
                listener.handle.stop();
                log::debug!("Unregistered listener for trigger '{}'", trigger_id);
                true
            }
            None => false,
        }
    }

    /// Replace a listener's filter without restarting it
    pub fn update_filter(&self, trigger_id: &str, filter: Value) -> bool {
        match self.listeners.write().get_mut(trigger_id) {
            Some(listener) => {
                listener.filter = filter;
                true
            }
            None => false,
        }
    }

    pub fn filter(&self, trigger_id: &str) -> Option<Value> {
        self.listeners.read().get(trigger_id).map(|l| l.filter.clone())
    }

    pub fn contains(&self, trigger_id: &str) -> bool {
        self.listeners.read().contains_key(trigger_id)
    }

    pub fn trigger_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.listeners.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Stop and remove every listener
    pub fn stop_all(&self) {
        for (_, listener) in self.listeners.write().drain() {
            listener.handle.stop();
        }
    }
}

impl<H: ListenerHandle> Default for ListenerTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ListenerHandle> Drop for ListenerTable<H> {
    fn drop(&mut self) {
        self.stop_all();
    }
}
