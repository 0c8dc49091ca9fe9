//! Token tampering and validity-window tests

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use fleet_gateway::auth::{AuthErrorKind, TokenAuthority};
use fleet_gateway::config::AuthConfig;

fn authority() -> TokenAuthority {
    TokenAuthority::new(&AuthConfig {
        secret: "integration-test-secret".to_string(),
        token_ttl_secs: 900,
        clock_skew_secs: 5,
        users: vec![],
    })
}

#[test]
fn tampered_payload_flips_to_signature_invalid() {
    let authority = authority();
    let token = authority.issue("alice", &["user".to_string()]).expect("issue");

    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 3);

    let payload = URL_SAFE_NO_PAD.decode(parts[1]).expect("decode payload");
    let tampered_json = String::from_utf8(payload)
        .expect("utf8")
        .replace("alice", "mallory");
    let tampered_payload = URL_SAFE_NO_PAD.encode(tampered_json.as_bytes());

    let tampered = format!("{}.{}.{}", parts[0], tampered_payload, parts[2]);
    assert_eq!(
        authority.validate(&tampered),
        Err(AuthErrorKind::SignatureInvalid)
    );
}

#[test]
fn tampered_signature_flips_to_signature_invalid() {
    let authority = authority();
    let token = authority.issue("alice", &[]).expect("issue");

    let parts: Vec<&str> = token.split('.').collect();
    let mut sig = URL_SAFE_NO_PAD.decode(parts[2]).expect("decode signature");
    sig[0] ^= 0x01;
    let tampered = format!("{}.{}.{}", parts[0], parts[1], URL_SAFE_NO_PAD.encode(&sig));

    assert_eq!(
        authority.validate(&tampered),
        Err(AuthErrorKind::SignatureInvalid)
    );
}

#[test]
fn missing_segments_are_malformed() {
    let authority = authority();
    let token = authority.issue("alice", &[]).expect("issue");
    let parts: Vec<&str> = token.split('.').collect();

    let two_segments = format!("{}.{}", parts[0], parts[1]);
    assert_eq!(
        authority.validate(&two_segments),
        Err(AuthErrorKind::Malformed)
    );
}

#[test]
fn roles_survive_the_round_trip() {
    let authority = authority();
    let roles = vec!["user".to_string(), "admin".to_string()];
    let token = authority.issue("alice", &roles).expect("issue");
    let claims = authority.validate(&token).expect("valid");
    assert_eq!(claims.roles, roles);
}
