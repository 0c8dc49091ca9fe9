//! Application settings and configuration management

use crate::error::{GatewayError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Token authority configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HS256 signing secret; never logged
    pub secret: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,
    /// Static credential set for the built-in verifier (dev/test deployments)
    #[serde(default)]
    pub users: Vec<StaticUser>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_secs: default_token_ttl(),
            clock_skew_secs: default_clock_skew(),
            users: vec![],
        }
    }
}

fn default_token_ttl() -> u64 {
    900
}

fn default_clock_skew() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Service registry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    #[serde(default = "default_suspect_after")]
    pub suspect_after_secs: u64,
    #[serde(default = "default_expire_after")]
    pub expire_after_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            suspect_after_secs: default_suspect_after(),
            expire_after_secs: default_expire_after(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_suspect_after() -> u64 {
    10
}

fn default_expire_after() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    10
}

impl RegistryConfig {
    pub fn suspect_after(&self) -> Duration {
        Duration::from_secs(self.suspect_after_secs)
    }

    pub fn expire_after(&self) -> Duration {
        Duration::from_secs(self.expire_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cool_down")]
    pub cool_down_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cool_down_ms: default_cool_down(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cool_down() -> u64 {
    30_000
}

impl BreakerConfig {
    pub fn cool_down(&self) -> Duration {
        Duration::from_millis(self.cool_down_ms)
    }
}

/// Outbound forwarding configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardConfig {
    /// Additional attempts after the first, idempotent methods only
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            attempt_timeout_ms: default_attempt_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_retry_budget() -> u32 {
    2
}

fn default_attempt_timeout() -> u64 {
    10_000
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

impl ForwardConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

/// CORS configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// One declarative route table entry; evaluated in declaration order,
/// first match wins
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    pub id: String,
    pub path_prefix: String,
    #[serde(default)]
    pub host: Option<String>,
    /// Logical service name resolved through the registry
    pub service: String,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

/// Closed set of route filters, applied in declared order
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    RequireAuth,
    StripPrefix { segments: usize },
    RewritePath { from: String, to: String },
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("auth.secret", "")?
            // Load from configuration file
            .add_source(
                File::with_name(path.as_ref().to_str().unwrap_or("config/default"))
                    .required(false),
            )
            // Override with environment variables (prefixed with FLEET_GATEWAY_)
            .add_source(
                Environment::with_prefix("FLEET_GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(GatewayError::Config(config::ConfigError::Message(
                "Server port cannot be 0".to_string(),
            )));
        }

        if self.auth.secret.is_empty() {
            return Err(GatewayError::Config(config::ConfigError::Message(
                "auth.secret must be set".to_string(),
            )));
        }

        if self.registry.expire_after_secs <= self.registry.suspect_after_secs {
            return Err(GatewayError::Config(config::ConfigError::Message(
                "registry.expire_after_secs must exceed registry.suspect_after_secs".to_string(),
            )));
        }

        if self.breaker.failure_threshold == 0 {
            return Err(GatewayError::Config(config::ConfigError::Message(
                "breaker.failure_threshold must be at least 1".to_string(),
            )));
        }

        for route in &self.routes {
            if route.id.is_empty() || route.service.is_empty() {
                return Err(GatewayError::Config(config::ConfigError::Message(
                    "Route id and service cannot be empty".to_string(),
                )));
            }
            if !route.path_prefix.starts_with('/') {
                return Err(GatewayError::Config(config::ConfigError::Message(
                    format!("Route '{}' path_prefix must start with '/'", route.id),
                )));
            }
        }

        Ok(())
    }
}
