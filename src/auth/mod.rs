//! Authentication: token authority and the credential verification seam

pub mod token;
pub mod verifier;

pub use token::{AuthErrorKind, TokenAuthority, TokenClaims};
pub use verifier::{CredentialVerifier, StaticCredentialVerifier, VerifiedIdentity};
