//! # Message Subscriber
//!
//! Defines the subscription side of the bus.

use crate::messages::BusMessage;
use crate::publisher::BusError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Trait for subscribing to a topic on the bus.
pub trait MessageSubscriber: Send + Sync {
    /// Subscribe to every message published on `topic` from now on.
    fn subscribe(&self, topic: &str) -> Result<Subscription, BusError>;
}

/// A subscription handle for receiving messages from one topic.
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    /// Topic this subscription listens on.
    topic: String,

    /// The broadcast receiver.
    receiver: broadcast::Receiver<BusMessage>,

    /// Reference to subscription tracking (for cleanup).
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
}

impl Subscription {
    pub(crate) fn new(
        topic: String,
        receiver: broadcast::Receiver<BusMessage>,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    ) -> Self {
        Self {
            topic,
            receiver,
            subscriptions,
        }
    }

    /// Receive the next message on the topic.
    ///
    /// # Returns
    ///
    /// - `Some(message)` - The next message
    /// - `None` - The channel was closed (bus dropped)
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(topic = %self.topic, lagged = count, "Subscriber lagged, some messages dropped");
                }
            }
        }
    }

    /// Try to receive the next message without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(message))` - A message was available
    /// - `Ok(None)` - No message available (would block)
    /// - `Err(BusError::Disconnected)` - The channel was closed
    pub fn try_recv(&mut self) -> Result<Option<BusMessage>, BusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Ok(Some(message)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => return Err(BusError::Disconnected),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(topic = %self.topic, lagged = count, "Subscriber lagged, some messages dropped");
                }
            }
        }
    }

    /// Topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Ok(mut subs) = self.subscriptions.write() else {
            return;
        };
        if let Some(count) = subs.get_mut(&self.topic) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                subs.remove(&self.topic);
            }
        }
        debug!(topic = %self.topic, "Subscription dropped");
    }
}
