//! Service Registry - routing table synchronized from registry events.
//!
//! Descriptors are kept in order of last change: a changed update moves the
//! descriptor to the end, an identical update leaves it where it is.
//! [`ServiceRegistry::resolve`] returns the first match in that order, so when
//! two services claim the same route the one that changed least recently wins.

use crate::domain::types::ServiceDescriptor;
use parking_lot::RwLock;
use tracing::debug;

/// Routing table of known services.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: RwLock<Vec<ServiceDescriptor>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `descriptor`, replacing whatever service answers to its id or
    /// its name.
    ///
    /// Online events identify a service by a single id while list entries
    /// carry a separate id and name, so either key identifies the slot.
    /// Returns `true` when the service was unknown or any field differs,
    /// `false` for an identical redundant update.
    pub fn update(&self, descriptor: ServiceDescriptor) -> bool {
        let mut services = self.services.write();
        let same_service =
            |s: &ServiceDescriptor| s.is_named(&descriptor.id) || s.is_named(&descriptor.name);

        let matches = services.iter().filter(|s| same_service(s)).count();
        if matches == 1 && services.iter().any(|s| *s == descriptor) {
            return false;
        }

        services.retain(|s| !same_service(s));
        if matches == 0 {
            debug!(service = %descriptor.id, "Service descriptor added");
        } else {
            debug!(service = %descriptor.id, replaced = matches, "Service descriptor replaced");
        }
        services.push(descriptor);
        true
    }

    /// Remove the service named `key` (by id or name).
    pub fn remove(&self, key: &str) -> bool {
        self.take(key).is_some()
    }

    /// Remove and return the service named `key` (by id or name).
    ///
    /// Offline events carry whichever identifier the service announced with,
    /// so both are accepted. Every descriptor answering to `key` is removed;
    /// the first one is returned.
    pub fn take(&self, key: &str) -> Option<ServiceDescriptor> {
        let mut services = self.services.write();
        let mut removed = None;

        services.retain(|s| {
            if !s.is_named(key) {
                return true;
            }
            if removed.is_none() {
                removed = Some(s.clone());
            }
            false
        });

        if removed.is_some() {
            debug!(service = key, "Service descriptor removed");
        }
        removed
    }

    /// First service (in order of last change) claiming `method` + `path`.
    pub fn resolve(&self, method: &str, path: &str) -> Option<ServiceDescriptor> {
        self.services
            .read()
            .iter()
            .find(|s| s.handles(method, path))
            .cloned()
    }

    /// Look up a service by id or name.
    pub fn get(&self, key: &str) -> Option<ServiceDescriptor> {
        self.services.read().iter().find(|s| s.is_named(key)).cloned()
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    /// Service ids in resolution order.
    pub fn service_ids(&self) -> Vec<String> {
        self.services.read().iter().map(|s| s.id.clone()).collect()
    }
}
