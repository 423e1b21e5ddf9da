//! The network boundary the session core suspends at.
//!
//! Implementations wrap the real credential/verification endpoints; tests
//! inject doubles. Timeouts are the implementation's responsibility: a call
//! that gives up must resolve to an error, never hang.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use masthead_core::UserRecord;

use crate::error::SessionError;

/// A freshly issued credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Successful credential issuance: the grant plus the confirmed identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSuccess {
    pub user: UserRecord,
    pub grant: TokenGrant,
}

/// Auth endpoints as seen from the client.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a token. The issuance endpoint itself is an
    /// external collaborator; the core only consumes its output shape.
    async fn login(&self, username: &str, password: &str) -> Result<LoginSuccess, SessionError>;

    /// Ask the server whether `token` is still good; returns the freshened
    /// profile on success.
    async fn validate(&self, token: &str) -> Result<UserRecord, SessionError>;

    /// Trade a (possibly just-expired) token for a fresh grant.
    async fn refresh(&self, token: &str) -> Result<TokenGrant, SessionError>;

    /// Best-effort server-side logout acknowledgement.
    async fn logout(&self, token: &str) -> Result<(), SessionError>;
}
