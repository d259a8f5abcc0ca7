//! Per-client delivery of webhook-started run results
//!
//! A webhook-started run finishes after the request that started it has been
//! answered. Its result is published under the client's correlation id to
//! whoever subscribed for that id.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{FlowError, Result};
use crate::run::ExecutionRun;

const CHANNEL_CAPACITY: usize = 16;

/// Message delivered to a webhook client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WebhookMessage {
    /// The run reached a terminal state
    Completed(ExecutionRun),
    /// The run could not be started
    #[serde(rename_all = "camelCase")]
    Failed { message: String },
}

/// Publish/subscribe channel keyed by client correlation id
pub struct WebhookChannel {
    senders: Mutex<HashMap<String, broadcast::Sender<WebhookMessage>>>,
}

impl WebhookChannel {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to results for `client_id`
    pub fn subscribe(&self, client_id: &str) -> broadcast::Receiver<WebhookMessage> {
        self.senders
            .lock()
            .entry(client_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver a message to every subscriber of `client_id`
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, client_id: &str, message: WebhookMessage) -> Result<usize> {
        let senders = self.senders.lock();
        let sender = senders
            .get(client_id)
            .ok_or_else(|| FlowError::ChannelClosed(format!("no subscriber for client '{}'", client_id)))?;
        sender
            .send(message)
            .map_err(|_| FlowError::ChannelClosed(format!("all subscribers for client '{}' left", client_id)))
    }

    /// Deliver the final message for `client_id` and retire its channel
    ///
    /// Subscribers receive the message and then see the channel close. The
    /// entry is removed even when nobody is listening any more.
    pub fn publish_once(&self, client_id: &str, message: WebhookMessage) -> Result<usize> {
        let sender = self
            .senders
            .lock()
            .remove(client_id)
            .ok_or_else(|| FlowError::ChannelClosed(format!("no subscriber for client '{}'", client_id)))?;
        sender
            .send(message)
            .map_err(|_| FlowError::ChannelClosed(format!("all subscribers for client '{}' left", client_id)))
    }

    /// Drop the channel for `client_id`; subscribers see it close
    pub fn close(&self, client_id: &str) -> bool {
        self.senders.lock().remove(client_id).is_some()
    }

    pub fn subscriber_count(&self, client_id: &str) -> usize {
        self.senders
            .lock()
            .get(client_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for WebhookChannel {
    fn default() -> Self {
        Self::new()
    }
}
