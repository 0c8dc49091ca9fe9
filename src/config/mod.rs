//! Configuration module

pub mod settings;

pub use settings::{
    AuthConfig, BreakerConfig, CorsConfig, FilterConfig, ForwardConfig, LoggingConfig,
    RegistryConfig, RouteConfig, ServerConfig, Settings, StaticUser,
};
