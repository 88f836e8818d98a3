//! Instance registry.
//!
//! # Responsibilities
//! - Hold the set of known instances in registration order
//! - Provide the healthy set used for selection
//! - Hand out defensive snapshots

use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

use crate::load_balancer::instance::{InstanceSnapshot, ServiceInstance};

/// Registry of all known instances.
///
/// Iteration order is registration order; selection ties and round-robin
/// positions depend on it.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: RwLock<Vec<Arc<ServiceInstance>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, instance: Arc<ServiceInstance>) {
        self.instances.write().push(instance);
    }

    /// Remove an instance, returning it if it was present.
    pub fn remove(&self, id: Uuid) -> Option<Arc<ServiceInstance>> {
        let mut instances = self.instances.write();
        let index = instances.iter().position(|i| i.id == id)?;
        Some(instances.remove(index))
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<ServiceInstance>> {
        self.instances.read().iter().find(|i| i.id == id).cloned()
    }

    /// All instances (for health checking and draining).
    pub fn all(&self) -> Vec<Arc<ServiceInstance>> {
        self.instances.read().clone()
    }

    /// Instances currently eligible for selection.
    pub fn healthy(&self) -> Vec<Arc<ServiceInstance>> {
        self.instances
            .read()
            .iter()
            .filter(|i| i.is_healthy())
            .cloned()
            .collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.instances.read().iter().filter(|i| i.is_healthy()).count()
    }

    /// Sum of `max_connections` over healthy instances.
    pub fn healthy_capacity(&self) -> usize {
        self.instances
            .read()
            .iter()
            .filter(|i| i.is_healthy())
            .map(|i| i.max_connections)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<InstanceSnapshot> {
        self.instances.read().iter().map(|i| i.snapshot()).collect()
    }
}
