//! Per-instance circuit breakers
//!
//! Keyed by (logical service, instance id): an instance that is reachable per
//! heartbeat but erroring is the breaker's concern, not the registry's. State
//! is built lazily on first traffic and never persisted.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BreakerConfig;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are pre-emptively rejected until the cool-down elapses
    Open,
    /// Exactly one probe request is allowed through
    HalfOpen,
}

struct BreakerCell {
    state: CircuitState,
    consecutive_failures: u32,
    entered_at: Instant,
    probe_in_flight: bool,
}

impl BreakerCell {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            entered_at: Instant::now(),
            probe_in_flight: false,
        }
    }
}

/// All breakers, one per (service, instance) pair
pub struct CircuitBreakerMap {
    config: BreakerConfig,
    cells: DashMap<(String, String), Mutex<BreakerCell>>,
}

impl CircuitBreakerMap {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            cells: DashMap::new(),
        }
    }

    fn with_cell<R>(&self, service: &str, id: &str, f: impl FnOnce(&mut BreakerCell) -> R) -> R {
        let cell = self
            .cells
            .entry((service.to_string(), id.to_string()))
            .or_insert_with(|| Mutex::new(BreakerCell::new()));
        let mut guard = cell.lock();
        f(&mut guard)
    }

    /// Current state, as an outside observer sees it: an Open breaker whose
    /// cool-down has elapsed reports HalfOpen (probe-eligible)
    pub fn state(&self, service: &str, id: &str) -> CircuitState {
        let cool_down = self.config.cool_down();
        self.with_cell(service, id, |cell| match cell.state {
            CircuitState::Open if cell.entered_at.elapsed() >= cool_down => CircuitState::HalfOpen,
            state => state,
        })
    }

    /// May a request be sent to this instance right now?
    ///
    /// Closed always admits. Open admits nothing until the cool-down has
    /// elapsed, then transitions to HalfOpen and admits the caller as the
    /// single probe; further callers are rejected until the probe outcome is
    /// recorded. A `true` return must be balanced by a `record` call.
    pub fn acquire(&self, service: &str, id: &str) -> bool {
        let cool_down = self.config.cool_down();
        self.with_cell(service, id, |cell| match cell.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if cell.entered_at.elapsed() >= cool_down {
                    cell.state = CircuitState::HalfOpen;
                    cell.entered_at = Instant::now();
                    cell.probe_in_flight = true;
                    debug!(service, instance = %id, "Cool-down elapsed, admitting probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                // A probe whose outcome never arrived (caller cancelled) is
                // reclaimable after one cool-down interval
                if !cell.probe_in_flight || cell.entered_at.elapsed() >= cool_down {
                    cell.probe_in_flight = true;
                    cell.entered_at = Instant::now();
                    true
                } else {
                    false
                }
            }
        })
    }

    /// Record a request outcome and drive state transitions
    pub fn record(&self, service: &str, id: &str, success: bool) {
        let threshold = self.config.failure_threshold;
        self.with_cell(service, id, |cell| match cell.state {
            CircuitState::Closed => {
                if success {
                    cell.consecutive_failures = 0;
                } else {
                    cell.consecutive_failures += 1;
                    if cell.consecutive_failures >= threshold {
                        cell.state = CircuitState::Open;
                        cell.entered_at = Instant::now();
                        warn!(
                            service,
                            instance = %id,
                            failures = cell.consecutive_failures,
                            "Circuit breaker opened"
                        );
                    }
                }
            }
            CircuitState::HalfOpen => {
                cell.probe_in_flight = false;
                if success {
                    cell.state = CircuitState::Closed;
                    cell.consecutive_failures = 0;
                    cell.entered_at = Instant::now();
                    info!(service, instance = %id, "Probe succeeded, circuit breaker closed");
                } else {
                    cell.state = CircuitState::Open;
                    cell.entered_at = Instant::now();
                    warn!(service, instance = %id, "Probe failed, circuit breaker reopened");
                }
            }
            // Late outcome from before the circuit opened
            CircuitState::Open => {}
        });
    }
}
