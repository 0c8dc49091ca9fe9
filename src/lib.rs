//! Fleet Gateway
//!
//! Service discovery and gateway routing with delegated authentication:
//! heartbeat-driven registry, declarative routing with filter chains, signed
//! identity tokens, per-instance circuit breaking, and load-balanced
//! forwarding with bounded retries.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod registry;

pub use error::{GatewayError, Result};

use std::sync::Arc;

use auth::{CredentialVerifier, StaticCredentialVerifier, TokenAuthority};
use config::Settings;
use gateway::{
    circuit_breaker::CircuitBreakerMap, dispatcher::Dispatcher, load_balancer::LoadBalancer,
    router::RouteTable,
};
use registry::ServiceRegistry;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,
    pub registry: Arc<ServiceRegistry>,
    pub authority: Arc<TokenAuthority>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub breakers: Arc<CircuitBreakerMap>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Wire all components from settings. The registry sweep task is not
    /// started here; callers own that lifecycle
    pub fn from_settings(settings: Settings) -> Result<Arc<Self>> {
        let registry = Arc::new(ServiceRegistry::new(settings.registry.clone()));
        let authority = Arc::new(TokenAuthority::new(&settings.auth));
        let verifier: Arc<dyn CredentialVerifier> =
            Arc::new(StaticCredentialVerifier::new(settings.auth.users.clone()));
        let breakers = Arc::new(CircuitBreakerMap::new(settings.breaker.clone()));
        let balancer = Arc::new(LoadBalancer::new(Arc::clone(&registry), Arc::clone(&breakers)));
        let dispatcher = Arc::new(Dispatcher::new(
            RouteTable::new(settings.routes.clone()),
            Arc::clone(&authority),
            balancer,
            Arc::clone(&breakers),
            settings.forward.clone(),
        )?);

        Ok(Arc::new(Self {
            settings,
            registry,
            authority,
            verifier,
            breakers,
            dispatcher,
        }))
    }
}
