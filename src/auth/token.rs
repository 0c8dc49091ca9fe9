//! Token authority: issues and validates signed identity tokens
//!
//! Validation is a pure function of the token, the authority's key material
//! and the current time (no I/O), so the dispatcher can call it inline on
//! the hot path.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::AuthConfig;
use crate::error::{GatewayError, Result};

/// Claims carried by an identity token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub iat: u64,
    pub exp: u64,
}

/// Why a token failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Structurally invalid (not three segments, bad base64, bad claims)
    Malformed,
    /// Signature does not verify against the authority's key
    SignatureInvalid,
    /// Outside the [issued-at, expires-at) window, beyond skew tolerance
    Expired,
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorKind::Malformed => write!(f, "token is malformed"),
            AuthErrorKind::SignatureInvalid => write!(f, "token signature is invalid"),
            AuthErrorKind::Expired => write!(f, "token has expired"),
        }
    }
}

/// Issues and validates HS256-signed identity tokens
pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl_secs: u64,
    clock_skew_secs: u64,
}

impl TokenAuthority {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            token_ttl_secs: config.token_ttl_secs,
            clock_skew_secs: config.clock_skew_secs,
        }
    }

    pub fn token_ttl_secs(&self) -> u64 {
        self.token_ttl_secs
    }

    /// Issue a token for an already-verified identity
    pub fn issue(&self, subject: &str, roles: &[String]) -> Result<String> {
        let iat = unix_now();
        self.issue_with_timestamps(subject, roles, iat, iat + self.token_ttl_secs)
    }

    /// Issue with explicit timestamps; `issue` delegates here, and tests use
    /// it to mint tokens at arbitrary points in their validity window
    pub fn issue_with_timestamps(
        &self,
        subject: &str,
        roles: &[String],
        iat: u64,
        exp: u64,
    ) -> Result<String> {
        let claims = TokenClaims {
            sub: subject.to_string(),
            roles: roles.to_vec(),
            iat,
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| GatewayError::Internal(format!("Failed to sign token: {e}")))
    }

    /// Validate a token and return its claims
    pub fn validate(&self, token: &str) -> std::result::Result<TokenClaims, AuthErrorKind> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.clock_skew_secs;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthErrorKind::Expired,
                ErrorKind::InvalidSignature => AuthErrorKind::SignatureInvalid,
                _ => AuthErrorKind::Malformed,
            }
        })?;

        // jsonwebtoken does not check issued-at; a token from the future is
        // outside its validity window
        if data.claims.iat > unix_now() + self.clock_skew_secs {
            return Err(AuthErrorKind::Expired);
        }

        Ok(data.claims)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
