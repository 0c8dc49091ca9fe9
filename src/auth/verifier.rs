//! Credential verification seam
//!
//! Checking raw credentials against a user store is outside this core; the
//! trait is the boundary. The static implementation serves dev and test
//! deployments from the config file.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::StaticUser;
use crate::error::{GatewayError, Result};

/// Outcome of a successful credential check
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub roles: Vec<String>,
}

/// External collaborator that verifies raw credentials
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> Result<VerifiedIdentity>;
}

/// Config-backed verifier with a fixed user set
pub struct StaticCredentialVerifier {
    users: HashMap<String, StaticUser>,
}

impl StaticCredentialVerifier {
    pub fn new(users: Vec<StaticUser>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.username.clone(), u))
                .collect(),
        }
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentialVerifier {
    async fn verify(&self, username: &str, password: &str) -> Result<VerifiedIdentity> {
        match self.users.get(username) {
            Some(user) if user.password == password => Ok(VerifiedIdentity {
                subject: user.username.clone(),
                roles: user.roles.clone(),
            }),
            _ => Err(GatewayError::InvalidCredentials),
        }
    }
}
