//! Common error types for the gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::token::AuthErrorKind;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No route matches {0}")]
    RouteNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthFailure(AuthErrorKind),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("No healthy instance available for service: {0}")]
    NoHealthyInstance(String),

    #[error("Upstream unreachable for service {service}: {detail}")]
    TransportFailure { service: String, detail: String },

    #[error("Upstream request failed for service {service} (not retried): {detail}")]
    NonIdempotentFailure { service: String, detail: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response envelope
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = match &self {
            GatewayError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            GatewayError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            GatewayError::Json(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                Some("invalid_json"),
            ),
            GatewayError::RouteNotFound(_) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                Some("route_not_found"),
            ),
            GatewayError::AuthFailure(kind) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                Some(match kind {
                    AuthErrorKind::Malformed => "token_malformed",
                    AuthErrorKind::SignatureInvalid => "token_invalid",
                    AuthErrorKind::Expired => "token_expired",
                }),
            ),
            GatewayError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                Some("invalid_credentials"),
            ),
            GatewayError::NoHealthyInstance(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "server_error",
                Some("no_healthy_instance"),
            ),
            GatewayError::TransportFailure { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "upstream_error",
                Some("upstream_unreachable"),
            ),
            GatewayError::NonIdempotentFailure { .. } => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                Some("upstream_failed"),
            ),
            GatewayError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error", None)
            }
            GatewayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, GatewayError>;
