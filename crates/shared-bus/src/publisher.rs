//! # Message Publisher
//!
//! Defines the publishing side of the bus and the in-memory implementation.

use crate::messages::BusMessage;
use crate::subscriber::{MessageSubscriber, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Errors from bus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus connection is down.
    #[error("message bus disconnected")]
    Disconnected,

    /// The transport rejected the message.
    #[error("publish to topic `{topic}` failed: {reason}")]
    PublishFailed { topic: String, reason: String },
}

/// Trait for publishing messages to a topic.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish a message to `topic`.
    ///
    /// # Returns
    ///
    /// The number of active subscribers that received the message.
    async fn publish(&self, topic: &str, message: BusMessage) -> Result<usize, BusError>;

    /// Get the total number of messages published.
    fn messages_published(&self) -> u64;
}

/// A full bus client: publish and subscribe.
pub trait MessageBus: MessagePublisher + MessageSubscriber {}

impl<T: MessagePublisher + MessageSubscriber> MessageBus for T {}

/// In-memory implementation of the bus.
///
/// Each topic is backed by its own `tokio::sync::broadcast` channel, which
/// keeps ordering per topic and fans out to every subscriber of that topic.
/// Suitable for single-process deployments and tests; a broker-backed client
/// implements the same traits.
pub struct InMemoryMessageBus {
    /// Broadcast sender per topic.
    topics: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,

    /// Active subscription count by topic.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Total messages published.
    messages_published: AtomicU64,

    /// Cleared by [`InMemoryMessageBus::disconnect`].
    connected: AtomicBool,

    /// Channel capacity per topic.
    capacity: usize,
}

impl InMemoryMessageBus {
    /// Create a new in-memory bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory bus with specified per-topic capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            messages_published: AtomicU64::new(0),
            connected: AtomicBool::new(true),
            capacity: capacity.max(1),
        }
    }

    /// Get the number of live subscriptions on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .map(|subs| subs.get(topic).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the bus accepts publishes.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Simulate losing the broker connection: publishes fail until
    /// [`InMemoryMessageBus::reconnect`].
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Restore the connection after [`InMemoryMessageBus::disconnect`].
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::Release);
    }

    fn sender(&self, topic: &str) -> Option<broadcast::Sender<BusMessage>> {
        self.topics
            .read()
            .ok()
            .and_then(|topics| topics.get(topic).cloned())
    }

    fn sender_or_create(&self, topic: &str) -> Result<broadcast::Sender<BusMessage>, BusError> {
        if let Some(sender) = self.sender(topic) {
            return Ok(sender);
        }

        let mut topics = self.topics.write().map_err(|_| BusError::Disconnected)?;
        Ok(topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone())
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryMessageBus {
    async fn publish(&self, topic: &str, message: BusMessage) -> Result<usize, BusError> {
        if !self.is_connected() {
            return Err(BusError::Disconnected);
        }

        let kind = message.kind();
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        let Some(sender) = self.sender(topic) else {
            warn!(topic, kind, "Message dropped (topic has no subscribers)");
            return Ok(0);
        };

        match sender.send(message) {
            Ok(receivers) => {
                debug!(topic, kind, receivers, "Message published");
                Ok(receivers)
            }
            Err(_) => {
                // Every receiver has been dropped since the topic was created
                warn!(topic, kind, "Message dropped (no receivers)");
                Ok(0)
            }
        }
    }

    fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}

impl MessageSubscriber for InMemoryMessageBus {
    fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        if !self.is_connected() {
            return Err(BusError::Disconnected);
        }

        let receiver = self.sender_or_create(topic)?.subscribe();

        // Track subscription count
        if let Ok(mut subs) = self.subscriptions.write() {
            *subs.entry(topic.to_string()).or_insert(0) += 1;
        }

        debug!(topic, "New subscription created");

        Ok(Subscription::new(
            topic.to_string(),
            receiver,
            Arc::clone(&self.subscriptions),
        ))
    }
}
