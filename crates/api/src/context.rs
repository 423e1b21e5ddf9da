use masthead_auth::AccessClaims;
use masthead_core::UserRecord;

/// Authenticated request context, attached by the verification gate.
///
/// Presence of this extension means every gate check passed: the token
/// verified, the subject resolved, and the account is active.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: UserRecord,
    pub claims: AccessClaims,
}
