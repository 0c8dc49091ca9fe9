//! HTTP surface: registry endpoints, token endpoint, proxy fallback

pub mod routes;
