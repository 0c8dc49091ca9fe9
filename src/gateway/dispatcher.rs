//! Gateway dispatcher: route match, filter chain, auth, forward with retry
//!
//! One inbound request is handled entirely within its own task; if the caller
//! disconnects, dropping the handler future cancels the in-flight outbound
//! attempt and releases its connection.

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, Response, StatusCode},
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::auth::{TokenAuthority, TokenClaims};
use crate::config::{FilterConfig, ForwardConfig};
use crate::error::{GatewayError, Result};
use crate::gateway::circuit_breaker::CircuitBreakerMap;
use crate::gateway::load_balancer::LoadBalancer;
use crate::gateway::router::{strip_prefix_segments, Route, RouteTable};

/// Outcome of one forwarded attempt; fed to the breaker, logged, discarded
struct RequestOutcome {
    instance_id: String,
    success: bool,
    latency: Duration,
}

/// Orchestrates the full proxy path for inbound requests
pub struct Dispatcher {
    routes: RouteTable,
    authority: Arc<TokenAuthority>,
    balancer: Arc<LoadBalancer>,
    breakers: Arc<CircuitBreakerMap>,
    client: reqwest::Client,
    config: ForwardConfig,
}

impl Dispatcher {
    pub fn new(
        routes: RouteTable,
        authority: Arc<TokenAuthority>,
        balancer: Arc<LoadBalancer>,
        breakers: Arc<CircuitBreakerMap>,
        config: ForwardConfig,
    ) -> Result<Self> {
        // Timeouts are per-attempt; the retry loop bounds the total budget
        let client = reqwest::Client::builder()
            .timeout(config.attempt_timeout())
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            routes,
            authority,
            balancer,
            breakers,
            client,
            config,
        })
    }

    /// Handle one inbound request end to end
    pub async fn dispatch(&self, req: Request<Body>) -> Result<Response<Body>> {
        let method = req.method().clone();
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.split(':').next().unwrap_or(h).to_string());
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);

        let route = self
            .routes
            .matches(host.as_deref(), &path)
            .ok_or_else(|| GatewayError::RouteNotFound(path.clone()))?
            .clone();

        // Filter chain, in declared order; RequireAuth short-circuits on
        // failure before any forward attempt is made
        let mut outbound_path = path.clone();
        let mut identity: Option<TokenClaims> = None;
        for filter in &route.filters {
            match filter {
                FilterConfig::RequireAuth => {
                    let claims = self.authenticate(req.headers())?;
                    identity = Some(claims);
                }
                FilterConfig::StripPrefix { segments } => {
                    outbound_path = strip_prefix_segments(&outbound_path, *segments);
                }
                FilterConfig::RewritePath { from, to } => {
                    if outbound_path == *from {
                        outbound_path = to.clone();
                    }
                }
            }
        }

        let headers = req.headers().clone();
        let body = axum::body::to_bytes(req.into_body(), self.config.max_body_bytes)
            .await
            .map_err(|_| {
                GatewayError::InvalidRequest("Request body unreadable or too large".to_string())
            })?;

        self.forward(&route, &method, &outbound_path, query.as_deref(), &headers, identity, body)
            .await
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<TokenClaims> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(strip_bearer_scheme)
            .unwrap_or("");

        self.authority.validate(token).map_err(|kind| {
            warn!(reason = %kind, "Rejected unauthenticated request");
            GatewayError::AuthFailure(kind)
        })
    }

    /// Bounded retry loop: pick a not-yet-tried instance, forward, record.
    /// Only idempotent methods (GET/HEAD) are retried; a non-idempotent
    /// failure surfaces immediately rather than risking a duplicated effect.
    #[allow(clippy::too_many_arguments)]
    async fn forward(
        &self,
        route: &Route,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        identity: Option<TokenClaims>,
        body: axum::body::Bytes,
    ) -> Result<Response<Body>> {
        let service = &route.service;
        let idempotent = *method == Method::GET || *method == Method::HEAD;
        let max_attempts = 1 + self.config.retry_budget as usize;

        let mut tried: HashSet<String> = HashSet::new();
        let mut last_failure: Option<String> = None;

        for attempt in 1..=max_attempts {
            let Some(instance) = self.balancer.pick(service, &tried) else {
                return match last_failure {
                    None => Err(GatewayError::NoHealthyInstance(service.clone())),
                    Some(detail) => Err(GatewayError::TransportFailure {
                        service: service.clone(),
                        detail,
                    }),
                };
            };
            tried.insert(instance.id.clone());

            let started = Instant::now();
            let result = self
                .send_attempt(&instance.address, method, path, query, headers, identity.as_ref(), body.clone())
                .await;
            let latency = started.elapsed();

            match result {
                Ok(response) => {
                    self.record_outcome(
                        service,
                        RequestOutcome {
                            instance_id: instance.id,
                            success: true,
                            latency,
                        },
                    );
                    return Ok(response);
                }
                Err(detail) => {
                    self.record_outcome(
                        service,
                        RequestOutcome {
                            instance_id: instance.id.clone(),
                            success: false,
                            latency,
                        },
                    );

                    if !idempotent {
                        return Err(GatewayError::NonIdempotentFailure {
                            service: service.clone(),
                            detail,
                        });
                    }

                    warn!(
                        service = %service,
                        instance = %instance.id,
                        attempt,
                        max_attempts,
                        detail = %detail,
                        "Forward attempt failed"
                    );
                    last_failure = Some(detail);
                }
            }
        }

        Err(GatewayError::TransportFailure {
            service: service.clone(),
            detail: last_failure.unwrap_or_else(|| "exhausted retry budget".to_string()),
        })
    }

    /// One outbound attempt; `Err` is a transport-level failure description
    #[allow(clippy::too_many_arguments)]
    async fn send_attempt(
        &self,
        address: &str,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        identity: Option<&TokenClaims>,
        body: axum::body::Bytes,
    ) -> std::result::Result<Response<Body>, String> {
        let url = build_target_url(address, path, query);
        debug!(url = %url, method = %method, "Forwarding request");

        let out_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|e| format!("invalid method: {e}"))?;

        let mut builder = self
            .client
            .request(out_method, &url)
            .headers(outbound_headers(headers));
        if let Some(claims) = identity {
            builder = builder
                .header("x-auth-subject", claims.sub.clone())
                .header("x-auth-roles", claims.roles.join(","));
        }

        let upstream = builder
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| describe_transport_error(&e))?;

        let status = StatusCode::from_u16(upstream.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let resp_headers = inbound_headers(upstream.headers());

        // The body is streamed through, never buffered; the inbound size cap
        // does not apply to responses. A mid-body upstream failure reaches
        // the client as a truncated response.
        let mut response = Response::builder()
            .status(status)
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| format!("failed to assemble response: {e}"))?;
        *response.headers_mut() = resp_headers;
        Ok(response)
    }

    fn record_outcome(&self, service: &str, outcome: RequestOutcome) {
        info!(
            service,
            instance = %outcome.instance_id,
            success = outcome.success,
            latency_ms = outcome.latency.as_millis() as u64,
            "Request outcome"
        );
        self.breakers
            .record(service, &outcome.instance_id, outcome.success);
    }
}

// RFC 7235: the auth scheme token is case-insensitive
fn strip_bearer_scheme(value: &str) -> &str {
    match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim_start(),
        _ => value,
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "attempt timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        format!("transport error: {e}")
    }
}

fn build_target_url(address: &str, path: &str, query: Option<&str>) -> String {
    let base = if address.starts_with("http://") || address.starts_with("https://") {
        address.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", address.trim_end_matches('/'))
    };
    match query {
        Some(q) => format!("{base}{path}?{q}"),
        None => format!("{base}{path}"),
    }
}

// Hop-by-hop headers never cross the proxy boundary
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_forwardable(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !HOP_BY_HOP.contains(&lower.as_str()) && lower != "host" && lower != "content-length"
}

fn is_identity_header(name: &str) -> bool {
    name.to_ascii_lowercase().starts_with("x-auth-")
}

/// Convert inbound axum headers to the outbound reqwest header map.
/// Client-supplied identity headers are dropped here; only claims verified
/// by the gateway may set them.
fn outbound_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        if !is_forwardable(name.as_str()) || is_identity_header(name.as_str()) {
            continue;
        }
        if let (Ok(n), Ok(v)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(n, v);
        }
    }
    out
}

/// Convert upstream reqwest headers back to the axum response header map
fn inbound_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if !is_forwardable(name.as_str()) {
            continue;
        }
        if let (Ok(n), Ok(v)) = (
            header::HeaderName::from_bytes(name.as_str().as_bytes()),
            header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(n, v);
        }
    }
    out
}
