//! In-memory service registry driven by instance heartbeats
//!
//! Heartbeat expiry is the sole liveness signal: there is no active health
//! probing here. `snapshot` filters by heartbeat age at call time, so callers
//! never observe stale entries even between sweeps; the background sweep only
//! reclaims memory for instances that stopped renewing.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;

/// Health of an instance, derived from its heartbeat age
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthState {
    Healthy,
    Suspect,
    Dead,
}

/// One live instance of a logical service, as seen in a registry snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInstance {
    pub service: String,
    pub id: String,
    pub address: String,
    pub health: HealthState,
    pub last_heartbeat: DateTime<Utc>,
}

struct Entry {
    address: String,
    last_beat: Instant,
    last_beat_utc: DateTime<Utc>,
}

type ServiceMap = HashMap<String, HashMap<String, Entry>>;

/// Registry of live backend instances per logical service name
pub struct ServiceRegistry {
    config: RegistryConfig,
    services: Arc<RwLock<ServiceMap>>,
    sweep_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ServiceRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            services: Arc::new(RwLock::new(HashMap::new())),
            sweep_task: parking_lot::Mutex::new(None),
        }
    }

    /// Record a liveness announcement for an instance; idempotent upsert
    pub fn heartbeat(&self, service: &str, instance_id: &str, address: &str) {
        let mut services = self.services.write();
        let instances = services.entry(service.to_string()).or_default();

        let first = !instances.contains_key(instance_id);
        instances.insert(
            instance_id.to_string(),
            Entry {
                address: address.to_string(),
                last_beat: Instant::now(),
                last_beat_utc: Utc::now(),
            },
        );

        if first {
            info!(service = %service, instance = %instance_id, address = %address, "Instance registered");
        } else {
            debug!(service = %service, instance = %instance_id, "Heartbeat renewed");
        }
    }

    /// Remove an instance immediately (graceful shutdown signal)
    pub fn deregister(&self, service: &str, instance_id: &str) -> bool {
        let mut services = self.services.write();
        let removed = services
            .get_mut(service)
            .map(|instances| instances.remove(instance_id).is_some())
            .unwrap_or(false);

        if removed {
            info!(service = %service, instance = %instance_id, "Instance deregistered");
        }
        removed
    }

    /// Current live instances of a service, filtered by heartbeat freshness.
    ///
    /// An unknown service yields an empty vec, not an error.
    pub fn snapshot(&self, service: &str) -> Vec<ServiceInstance> {
        let now = Instant::now();
        let services = self.services.read();

        let Some(instances) = services.get(service) else {
            return Vec::new();
        };

        instances
            .iter()
            .filter_map(|(id, entry)| {
                let age = now.saturating_duration_since(entry.last_beat);
                if age >= self.config.expire_after() {
                    return None;
                }
                let health = if age < self.config.suspect_after() {
                    HealthState::Healthy
                } else {
                    HealthState::Suspect
                };
                Some(ServiceInstance {
                    service: service.to_string(),
                    id: id.clone(),
                    address: entry.address.clone(),
                    health,
                    last_heartbeat: entry.last_beat_utc,
                })
            })
            .collect()
    }

    /// Known service names with their live-instance counts
    pub fn services(&self) -> Vec<(String, usize)> {
        let now = Instant::now();
        let services = self.services.read();
        services
            .iter()
            .map(|(name, instances)| {
                let live = instances
                    .values()
                    .filter(|e| {
                        now.saturating_duration_since(e.last_beat) < self.config.expire_after()
                    })
                    .count();
                (name.clone(), live)
            })
            .collect()
    }

    /// Evict instances whose heartbeat age reached the expiry threshold
    pub fn sweep_once(&self) -> usize {
        sweep_map(&self.services, self.config.expire_after())
    }

    /// Start the periodic expiry sweep
    pub fn start_sweep(&self) {
        let services = Arc::clone(&self.services);
        let expire_after = self.config.expire_after();
        let interval = self.config.sweep_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let evicted = sweep_map(&services, expire_after);
                if evicted > 0 {
                    debug!(evicted, "Registry sweep completed");
                }
            }
        });

        *self.sweep_task.lock() = Some(handle);
        info!(interval_secs = interval.as_secs(), "Started registry sweep task");
    }

    /// Stop the expiry sweep task
    pub fn stop(&self) {
        if let Some(handle) = self.sweep_task.lock().take() {
            handle.abort();
            info!("Stopped registry sweep task");
        }
    }
}

fn sweep_map(services: &RwLock<ServiceMap>, expire_after: std::time::Duration) -> usize {
    let now = Instant::now();
    let mut services = services.write();
    let mut evicted = 0;

    for (name, instances) in services.iter_mut() {
        instances.retain(|id, entry| {
            let keep = now.saturating_duration_since(entry.last_beat) < expire_after;
            if !keep {
                warn!(service = %name, instance = %id, "Instance expired, evicting");
                evicted += 1;
            }
            keep
        });
    }
    services.retain(|_, instances| !instances.is_empty());

    evicted
}

impl Drop for ServiceRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.sweep_task.lock().take() {
            handle.abort();
        }
    }
}
