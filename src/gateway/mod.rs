//! Gateway module - routing, load balancing, circuit breaking, dispatch

pub mod circuit_breaker;
pub mod dispatcher;
pub mod load_balancer;
pub mod router;
