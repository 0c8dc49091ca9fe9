//! Configuration loading tests

use fleet_gateway::config::{FilterConfig, Settings};
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("tempfile");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_route_table_with_filters() {
    let file = write_config(
        r#"
[server]
port = 9090

[auth]
secret = "test-secret"

[registry]
expire_after_secs = 15

[breaker]
failure_threshold = 3

[forward]
retry_budget = 1

[[routes]]
id = "orders"
path_prefix = "/api/orders"
service = "orders"
filters = [{ type = "require_auth" }, { type = "strip_prefix", segments = 2 }]
"#,
    );

    let settings = Settings::load_from_path(file.path()).expect("load");
    settings.validate().expect("valid");

    assert_eq!(settings.server.port, 9090);
    assert_eq!(settings.registry.expire_after_secs, 15);
    assert_eq!(settings.breaker.failure_threshold, 3);
    assert_eq!(settings.forward.retry_budget, 1);

    assert_eq!(settings.routes.len(), 1);
    let route = &settings.routes[0];
    assert_eq!(route.service, "orders");
    assert!(matches!(route.filters[0], FilterConfig::RequireAuth));
    assert!(matches!(
        route.filters[1],
        FilterConfig::StripPrefix { segments: 2 }
    ));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let settings = Settings::load_from_path("/nonexistent/config.toml");
    // No file and no env secret: loads with defaults but fails validation
    let settings = settings.expect("defaults");
    assert!(settings.validate().is_err());
}

#[test]
fn validate_rejects_bad_route_prefix() {
    let file = write_config(
        r#"
[auth]
secret = "test-secret"

[registry]

[breaker]

[forward]

[[routes]]
id = "bad"
path_prefix = "no-slash"
service = "bad"
"#,
    );

    let settings = Settings::load_from_path(file.path()).expect("load");
    assert!(settings.validate().is_err());
}
