//! Registry Sync Handler - applies registry-topic messages to the routing table.
//!
//! The only writer of [`ServiceRegistry`]. For every bus-capable service it
//! learns about, it subscribes to the service's topic and forwards what
//! arrives there to [`RequestDispatcher::handle_service_message`].

use crate::dispatch::RequestDispatcher;
use crate::domain::registry::ServiceRegistry;
use crate::domain::types::{Channel, ServiceDescriptor};
use parking_lot::Mutex;
use shared_bus::{
    BusMessage, MessageBus, MessageSubscriber, ServiceAnnouncement, ServiceEntry, Subscription,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Consumes registry events and keeps service-topic subscriptions in step.
pub struct RegistrySyncHandler {
    registry: Arc<ServiceRegistry>,
    dispatcher: Arc<RequestDispatcher>,
    bus: Arc<dyn MessageBus>,
    /// Own service id, never subscribed to
    self_service_id: String,
    /// Forwarding task per subscribed service topic
    topics: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl RegistrySyncHandler {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        dispatcher: Arc<RequestDispatcher>,
        bus: Arc<dyn MessageBus>,
        self_service_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            bus,
            self_service_id: self_service_id.into(),
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Consume the registry topic until the bus closes.
    pub async fn run(self: Arc<Self>, mut subscription: Subscription) {
        info!(topic = subscription.topic(), "Registry sync started");
        while let Some(message) = subscription.recv().await {
            self.handle(message);
        }
        info!(topic = subscription.topic(), "Registry sync stopped (bus closed)");
    }

    /// Apply one registry-topic message.
    pub fn handle(&self, message: BusMessage) {
        match message {
            BusMessage::ServiceOnline(announcement) => self.on_service_online(&announcement),
            BusMessage::ServiceOffline {
                instance_id,
                service_id,
            } => self.on_service_offline(&instance_id, &service_id),
            BusMessage::ServiceListResponse(entries) => self.on_service_list(&entries),
            other => debug!(kind = other.kind(), "Ignoring message on registry topic"),
        }
    }

    /// Topics with a live forwarding task, sorted.
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.lock().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Stop forwarding on every service topic.
    pub fn shutdown(&self) {
        for (topic, task) in self.topics.lock().drain() {
            task.abort();
            debug!(topic, "Service topic forwarding stopped");
        }
    }

    fn on_service_online(&self, announcement: &ServiceAnnouncement) {
        let known = self
            .registry
            .get(&announcement.service_id)
            .map(|existing| existing.instances)
            .unwrap_or_default();
        let descriptor = ServiceDescriptor::from_announcement(announcement, &known);

        if !self.apply(&descriptor) || self.is_self(&descriptor) {
            return;
        }

        info!(
            service = %descriptor.id,
            instance = %announcement.instance_id,
            "Service online"
        );
        self.sync_subscription(&descriptor);
    }

    fn on_service_offline(&self, instance_id: &str, service_id: &str) {
        let Some(removed) = self.registry.take(service_id) else {
            debug!(service = service_id, "Offline event for unknown service");
            return;
        };
        if self.is_self(&removed) {
            return;
        }

        info!(service = service_id, instance = instance_id, "Service offline");
        self.unsubscribe(&removed.name);
    }

    fn on_service_list(&self, entries: &[ServiceEntry]) {
        info!(count = entries.len(), "Service list received");

        // Each entry stands alone; one that cannot use the bus does not stop the rest
        for entry in entries {
            let descriptor = ServiceDescriptor::from_entry(entry);
            if !self.apply(&descriptor) || self.is_self(&descriptor) {
                continue;
            }

            info!(
                service = %descriptor.name,
                instances = descriptor.instances.len(),
                "Service updated"
            );
            self.sync_subscription(&descriptor);
        }
    }

    /// Write `descriptor` to the registry. A replaced descriptor that went by
    /// another name loses its topic subscription.
    fn apply(&self, descriptor: &ServiceDescriptor) -> bool {
        let previous = self
            .registry
            .get(&descriptor.id)
            .or_else(|| self.registry.get(&descriptor.name));
        if !self.registry.update(descriptor.clone()) {
            return false;
        }
        if let Some(previous) = previous.filter(|p| p.name != descriptor.name) {
            self.unsubscribe(&previous.name);
        }
        true
    }

    fn is_self(&self, descriptor: &ServiceDescriptor) -> bool {
        descriptor.is_named(&self.self_service_id)
    }

    fn sync_subscription(&self, descriptor: &ServiceDescriptor) {
        if descriptor.supports(Channel::Bus) {
            self.subscribe(&descriptor.name);
        } else {
            self.unsubscribe(&descriptor.name);
        }
    }

    /// Subscribe to `topic` unless a forwarding task already runs for it.
    fn subscribe(&self, topic: &str) {
        let mut topics = self.topics.lock();
        if topics.get(topic).is_some_and(|task| !task.is_finished()) {
            return;
        }

        let subscription = match self.bus.subscribe(topic) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(topic, error = %e, "Failed to subscribe to service topic");
                return;
            }
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let task = tokio::spawn(forward_responses(subscription, dispatcher));
        topics.insert(topic.to_string(), task);
        debug!(topic, "Subscribed to service topic");
    }

    fn unsubscribe(&self, topic: &str) {
        if let Some(task) = self.topics.lock().remove(topic) {
            task.abort();
            debug!(topic, "Unsubscribed from service topic");
        }
    }
}

impl Drop for RegistrySyncHandler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn forward_responses(mut subscription: Subscription, dispatcher: Arc<RequestDispatcher>) {
    while let Some(message) = subscription.recv().await {
        dispatcher.handle_service_message(message);
    }
}
