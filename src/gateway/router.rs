//! Declarative route table
//!
//! Matching policy: routes are evaluated in declaration order and the first
//! predicate match wins. Ties are broken by declaration order, never by
//! specificity: a catch-all declared first shadows everything after it.

use tracing::debug;

use crate::config::{FilterConfig, RouteConfig};

/// One immutable route table entry
#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub path_prefix: String,
    pub host: Option<String>,
    pub service: String,
    pub filters: Vec<FilterConfig>,
}

impl Route {
    fn from_config(config: RouteConfig) -> Self {
        Self {
            id: config.id,
            path_prefix: config.path_prefix,
            host: config.host,
            service: config.service,
            filters: config.filters,
        }
    }

    fn matches(&self, host: Option<&str>, path: &str) -> bool {
        if let Some(ref expected) = self.host {
            match host {
                Some(h) if h.eq_ignore_ascii_case(expected) => {}
                _ => return false,
            }
        }
        path_has_prefix(path, &self.path_prefix)
    }
}

/// Prefix match on whole path segments: "/api/users" matches "/api/users"
/// and "/api/users/42" but not "/api/users2"
fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Ordered route table, immutable after load
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(configs: Vec<RouteConfig>) -> Self {
        Self {
            routes: configs.into_iter().map(Route::from_config).collect(),
        }
    }

    /// First route whose predicate matches, in declaration order
    pub fn matches(&self, host: Option<&str>, path: &str) -> Option<&Route> {
        let route = self.routes.iter().find(|r| r.matches(host, path));
        if let Some(route) = route {
            debug!(route = %route.id, service = %route.service, path = %path, "Route matched");
        }
        route
    }
}

/// Remove the first `segments` path segments; never returns an empty path
pub fn strip_prefix_segments(path: &str, segments: usize) -> String {
    let mut rest = path.trim_start_matches('/');
    for _ in 0..segments {
        match rest.split_once('/') {
            Some((_, tail)) => rest = tail,
            None => {
                rest = "";
                break;
            }
        }
    }
    format!("/{rest}")
}
