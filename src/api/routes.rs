//! Axum router wiring for the gateway

use axum::{
    extract::{Path, Request, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::CorsConfig;
use crate::error::Result;
use crate::registry::ServiceInstance;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings.cors);

    Router::new()
        .route("/health", get(health))
        .route("/registry/heartbeat", post(heartbeat))
        .route("/registry/deregister", post(deregister))
        .route("/registry/services", get(list_services))
        .route("/registry/services/:service", get(service_instances))
        .route("/auth/token", post(issue_token))
        .fallback(proxy)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if config.allowed_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    service: String,
    instance_id: Option<String>,
    address: String,
}

#[derive(Debug, Serialize)]
struct HeartbeatResponse {
    instance_id: String,
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HeartbeatRequest>,
) -> Json<HeartbeatResponse> {
    let instance_id = req
        .instance_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    state
        .registry
        .heartbeat(&req.service, &instance_id, &req.address);
    Json(HeartbeatResponse { instance_id })
}

#[derive(Debug, Deserialize)]
struct DeregisterRequest {
    service: String,
    instance_id: String,
}

async fn deregister(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeregisterRequest>,
) -> StatusCode {
    state.registry.deregister(&req.service, &req.instance_id);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
struct ServiceSummary {
    service: String,
    live_instances: usize,
}

async fn list_services(State(state): State<Arc<AppState>>) -> Json<Vec<ServiceSummary>> {
    let mut services: Vec<ServiceSummary> = state
        .registry
        .services()
        .into_iter()
        .map(|(service, live_instances)| ServiceSummary {
            service,
            live_instances,
        })
        .collect();
    services.sort_by(|a, b| a.service.cmp(&b.service));
    Json(services)
}

async fn service_instances(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Json<Vec<ServiceInstance>> {
    Json(state.registry.snapshot(&service))
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: u64,
}

async fn issue_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>> {
    let identity = state.verifier.verify(&req.username, &req.password).await?;
    let token = state.authority.issue(&identity.subject, &identity.roles)?;
    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
        expires_in: state.authority.token_ttl_secs(),
    }))
}

/// Everything that is not a gateway endpoint goes through the dispatcher
async fn proxy(State(state): State<Arc<AppState>>, req: Request) -> Response {
    match state.dispatcher.dispatch(req).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}
