//! Instance selection over the registry's live view
//!
//! Selection policy: uniform random among admissible instances. Random
//! avoids head-of-line pathologies under bursty traffic without a shared
//! round-robin cursor; the policy is applied consistently everywhere.

use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::gateway::circuit_breaker::CircuitBreakerMap;
use crate::registry::{ServiceInstance, ServiceRegistry};

/// Picks one live instance for a logical service
pub struct LoadBalancer {
    registry: Arc<ServiceRegistry>,
    breakers: Arc<CircuitBreakerMap>,
}

impl LoadBalancer {
    pub fn new(registry: Arc<ServiceRegistry>, breakers: Arc<CircuitBreakerMap>) -> Self {
        Self { registry, breakers }
    }

    /// Select an instance from the current registry snapshot, skipping
    /// instances the circuit breaker refuses (Open within cool-down) and any
    /// in `excluded` (already tried for this request).
    ///
    /// `None` means no capacity right now; a normal outcome, not a fault.
    pub fn pick(&self, service: &str, excluded: &HashSet<String>) -> Option<ServiceInstance> {
        let mut candidates: Vec<ServiceInstance> = self
            .registry
            .snapshot(service)
            .into_iter()
            .filter(|instance| !excluded.contains(&instance.id))
            .collect();

        candidates.shuffle(&mut rand::thread_rng());

        for instance in candidates {
            // Admission also claims the single HalfOpen probe slot; the
            // caller must record the outcome of every admitted attempt
            if self.breakers.acquire(service, &instance.id) {
                debug!(service, instance = %instance.id, address = %instance.address, "Instance selected");
                return Some(instance);
            }
        }

        debug!(service, "No admissible instance");
        None
    }
}
