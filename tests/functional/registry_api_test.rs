//! Registry and token endpoint tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use fleet_gateway::api::routes::create_router;
use fleet_gateway::config::{Settings, StaticUser};
use fleet_gateway::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn build_app() -> (Arc<AppState>, Router) {
    let mut settings = Settings::default();
    settings.auth.secret = "registry-api-test-secret".to_string();
    settings.auth.users = vec![StaticUser {
        username: "alice".to_string(),
        password: "s3cret".to_string(),
        roles: vec!["user".to_string()],
    }];
    let state = AppState::from_settings(settings).expect("state");
    let app = create_router(state.clone());
    (state, app)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

#[tokio::test]
async fn heartbeat_registers_and_deregister_removes() {
    let (_state, app) = build_app();

    let (status, body) = post_json(
        &app,
        "/registry/heartbeat",
        json!({"service": "orders", "address": "127.0.0.1:9001"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let instance_id = body["instance_id"].as_str().expect("generated id").to_string();
    assert!(!instance_id.is_empty());

    let (status, body) = get_json(&app, "/registry/services/orders").await;
    assert_eq!(status, StatusCode::OK);
    let instances = body.as_array().expect("array");
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0]["id"], instance_id);
    assert_eq!(instances[0]["health"], "Healthy");

    let (status, _) = post_json(
        &app,
        "/registry/deregister",
        json!({"service": "orders", "instance_id": instance_id}),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = get_json(&app, "/registry/services/orders").await;
    assert!(body.as_array().expect("array").is_empty());
}

#[tokio::test]
async fn services_listing_shows_live_counts() {
    let (state, app) = build_app();
    state.registry.heartbeat("orders", "i-1", "127.0.0.1:9001");
    state.registry.heartbeat("orders", "i-2", "127.0.0.1:9002");
    state.registry.heartbeat("billing", "i-3", "127.0.0.1:9003");

    let (status, body) = get_json(&app, "/registry/services").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            {"service": "billing", "live_instances": 1},
            {"service": "orders", "live_instances": 2}
        ])
    );
}

#[tokio::test]
async fn token_endpoint_issues_a_validatable_token() {
    let (state, app) = build_app();

    let (status, body) = post_json(
        &app,
        "/auth/token",
        json!({"username": "alice", "password": "s3cret"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);

    let token = body["access_token"].as_str().expect("token");
    let claims = state.authority.validate(token).expect("valid token");
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.roles, vec!["user".to_string()]);
}

#[tokio::test]
async fn token_endpoint_rejects_bad_credentials() {
    let (_state, app) = build_app();

    let (status, body) = post_json(
        &app,
        "/auth/token",
        json!({"username": "alice", "password": "wrong"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "invalid_credentials");
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let (_state, app) = build_app();
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
