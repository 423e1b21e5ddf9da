//! `masthead-auth` — pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: claims,
//! token verification, the error taxonomy shared by client and server, and
//! the static role→permission tables. Transports (the API gate, the client
//! session core) build on top of it.

pub mod claims;
pub mod error;
pub mod permissions;
pub mod verifier;

pub use claims::{AccessClaims, TokenValidationError, validate_claims};
pub use error::{AuthErrorCode, AuthErrorKind, RecoveryPolicy};
pub use permissions::{role_allows, role_permissions};
pub use verifier::{Hs256TokenKeys, TokenError, TokenSigner, TokenVerifier};
