//! Async orchestration of login/logout/refresh/validate over an injected
//! [`AuthApi`], wiring the cache, the deduplicator, and the state machine
//! together. This is the layer UI code talks to.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use masthead_auth::{AuthErrorCode, RecoveryPolicy};
use masthead_core::UserRecord;

use crate::api::AuthApi;
use crate::cache::{self, ValidationCache, fingerprint};
use crate::dedup::RequestDeduplicator;
use crate::error::SessionError;
use crate::state::{AuthAction, AuthStateMachine};
use crate::store::TokenStore;

/// Hard-coded fallback identity that bypasses the credential service when it
/// is unreachable. Configuration-gated and **off by default**: the upstream
/// behavior of an always-available bypass reads like a backdoor, so it has
/// to be asked for explicitly (local development, offline demos).
#[derive(Debug, Clone)]
pub struct DemoIdentity {
    pub username: String,
    pub password: String,
    pub user: UserRecord,
    pub session_ttl_secs: i64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub validation_positive_ttl_secs: i64,
    pub validation_negative_ttl_secs: i64,
    /// Window before expiry in which a proactive refresh is worthwhile.
    pub expiring_soon_threshold_secs: i64,
    pub demo_identity: Option<DemoIdentity>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            validation_positive_ttl_secs: cache::POSITIVE_TTL_SECS,
            validation_negative_ttl_secs: cache::NEGATIVE_TTL_SECS,
            expiring_soon_threshold_secs: 5 * 60,
            demo_identity: None,
        }
    }
}

/// What `ensure_valid` concluded about the current session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// No session to validate.
    Anonymous,
    Valid,
    /// The session was confirmed bad and has been torn down.
    Invalid,
}

pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    machine: Arc<AuthStateMachine>,
    store: TokenStore,
    cache: ValidationCache,
    validate_calls: RequestDeduplicator<UserRecord>,
    refresh_calls: RequestDeduplicator<crate::api::TokenGrant>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn AuthApi>,
        machine: Arc<AuthStateMachine>,
        store: TokenStore,
        config: SessionConfig,
    ) -> Self {
        Self {
            api,
            machine,
            store,
            cache: ValidationCache::new(),
            validate_calls: RequestDeduplicator::new(),
            refresh_calls: RequestDeduplicator::new(),
            config,
        }
    }

    pub fn machine(&self) -> &Arc<AuthStateMachine> {
        &self.machine
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    pub fn validation_cache(&self) -> &ValidationCache {
        &self.cache
    }

    /// Exchange credentials for a session.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserRecord, SessionError> {
        self.machine.dispatch(AuthAction::LoginStarted);

        match self.api.login(username, password).await {
            Ok(success) => {
                tracing::info!(user = %success.user.username, "login succeeded");
                self.cache.cache_result(
                    &fingerprint(&success.grant.token),
                    true,
                    Duration::seconds(self.config.validation_positive_ttl_secs),
                );
                let user = success.user.clone();
                self.machine.dispatch(AuthAction::LoginSucceeded {
                    user: success.user,
                    token: success.grant.token,
                    expiry: success.grant.expires_at,
                });
                Ok(user)
            }
            Err(err) => {
                if let Some(demo) = self.demo_fallback(username, password, &err) {
                    return Ok(demo);
                }
                tracing::warn!(code = %err.code(), "login failed");
                self.machine.dispatch(AuthAction::LoginFailed);
                Err(err)
            }
        }
    }

    /// Tear the session down locally, then tell the server (best effort).
    pub async fn logout(&self) {
        let token = self.store.get();
        self.machine.dispatch(AuthAction::Logout);

        if let Some(token) = token {
            if let Err(err) = self.api.logout(&token).await {
                tracing::debug!("server-side logout failed (ignored): {err}");
            }
        }
    }

    /// Trade the current token for a fresh grant. Deduplicated: concurrent
    /// callers share one network call.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let Some(token) = self.store.get() else {
            return Err(SessionError::NoSession);
        };

        let api = self.api.clone();
        let call_token = token.clone();
        let outcome = self
            .refresh_calls
            .dedup("refresh", || async move { api.refresh(&call_token).await })
            .await;

        match outcome {
            Ok(grant) => {
                if self.store.get().as_deref() != Some(token.as_str()) {
                    // Superseded (logout, or a competing refresh already
                    // landed): drop the result on the floor.
                    tracing::debug!("discarding refresh result for a superseded token");
                    return Ok(());
                }
                self.cache.cache_result(
                    &fingerprint(&grant.token),
                    true,
                    Duration::seconds(self.config.validation_positive_ttl_secs),
                );
                self.machine.dispatch(AuthAction::RefreshSucceeded {
                    token: grant.token,
                    expiry: grant.expires_at,
                });
                Ok(())
            }
            Err(err) => {
                match err.code().recovery() {
                    RecoveryPolicy::RetryWithBackoff | RecoveryPolicy::KeepSession => {
                        // Transient or non-credential fault: the session
                        // stands, the caller decides when to retry.
                        Err(err)
                    }
                    _ => {
                        tracing::info!(code = %err.code(), "refresh rejected; clearing session");
                        self.cache.cache_result(
                            &fingerprint(&token),
                            false,
                            Duration::seconds(self.config.validation_negative_ttl_secs),
                        );
                        self.machine.dispatch(AuthAction::TokenExpired);
                        Err(err)
                    }
                }
            }
        }
    }

    pub async fn ensure_valid(&self) -> Result<ValidationOutcome, SessionError> {
        self.ensure_valid_at(Utc::now()).await
    }

    /// Confirm the current session is good, hitting the server only when the
    /// cache cannot answer. Locally expired sessions get exactly one refresh
    /// attempt before anything is surfaced.
    pub async fn ensure_valid_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ValidationOutcome, SessionError> {
        let Some(token) = self.store.get() else {
            return Ok(ValidationOutcome::Anonymous);
        };

        if !self.store.is_valid_at(now) {
            return self.refresh_or_invalid().await;
        }

        let fp = fingerprint(&token);
        if let Some(valid) = self.cache.get_cached_at(&fp, now) {
            return Ok(if valid {
                ValidationOutcome::Valid
            } else {
                ValidationOutcome::Invalid
            });
        }

        self.machine.dispatch(AuthAction::ValidateStarted);
        let api = self.api.clone();
        let call_token = token.clone();
        let outcome = self
            .validate_calls
            .dedup(&format!("validate:{fp}"), || async move {
                api.validate(&call_token).await
            })
            .await;

        match outcome {
            Ok(user) => {
                self.cache.cache_result_at(
                    &fp,
                    true,
                    Duration::seconds(self.config.validation_positive_ttl_secs),
                    now,
                );
                self.machine
                    .dispatch_at(AuthAction::ValidateSucceeded { token, user }, now);
                Ok(ValidationOutcome::Valid)
            }
            Err(err) => match err.code().recovery() {
                RecoveryPolicy::RefreshThenRetry => self.refresh_or_invalid().await,
                RecoveryPolicy::ClearSession => {
                    self.cache.cache_result_at(
                        &fp,
                        false,
                        Duration::seconds(self.config.validation_negative_ttl_secs),
                        now,
                    );
                    self.machine
                        .dispatch_at(AuthAction::ValidateFailed { token }, now);
                    Ok(ValidationOutcome::Invalid)
                }
                _ => {
                    // Couldn't check, which is not the same as invalid. Short
                    // negative memo so we don't hammer a struggling server.
                    self.cache.cache_result_at(
                        &fp,
                        false,
                        Duration::seconds(self.config.validation_negative_ttl_secs),
                        now,
                    );
                    self.machine
                        .dispatch_at(AuthAction::ValidateDeferred { token }, now);
                    Err(err)
                }
            },
        }
    }

    /// Proactive refresh when expiry is close. Returns whether a refresh ran.
    pub async fn refresh_if_expiring_soon(&self) -> Result<bool, SessionError> {
        let threshold = Duration::seconds(self.config.expiring_soon_threshold_secs);
        if self.store.is_expiring_soon(threshold, Utc::now()) {
            self.refresh().await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Resolve the identity for a session adopted from another context.
    ///
    /// Resolution order: a profile already adopted from the event or store,
    /// then a server lookup, then any profile that appeared in the store
    /// meanwhile, then give up (the snapshot stays unauthenticated).
    pub async fn resync(&self) -> Result<ValidationOutcome, SessionError> {
        let Some(token) = self.store.get() else {
            return Ok(ValidationOutcome::Anonymous);
        };
        if self.machine.snapshot().user.is_some() {
            return Ok(ValidationOutcome::Valid);
        }
        if let Some(user) = self.store.user() {
            self.machine
                .dispatch(AuthAction::ProfileAdopted { token, user });
            return Ok(ValidationOutcome::Valid);
        }

        match self.api.validate(&token).await {
            Ok(user) => {
                self.cache.cache_result(
                    &fingerprint(&token),
                    true,
                    Duration::seconds(self.config.validation_positive_ttl_secs),
                );
                self.machine
                    .dispatch(AuthAction::ValidateSucceeded { token, user });
                Ok(ValidationOutcome::Valid)
            }
            Err(err) => match err.code().recovery() {
                RecoveryPolicy::ClearSession => {
                    self.machine.dispatch(AuthAction::ValidateFailed { token });
                    Ok(ValidationOutcome::Invalid)
                }
                _ => {
                    // Server unreachable; one last look at the store before
                    // giving up.
                    if let Some(user) = self.store.user() {
                        self.machine
                            .dispatch(AuthAction::ProfileAdopted { token, user });
                        return Ok(ValidationOutcome::Valid);
                    }
                    Err(err)
                }
            },
        }
    }

    async fn refresh_or_invalid(&self) -> Result<ValidationOutcome, SessionError> {
        match self.refresh().await {
            Ok(()) => Ok(ValidationOutcome::Valid),
            Err(err) if err.code().recovery() == RecoveryPolicy::RetryWithBackoff => Err(err),
            Err(_) => Ok(ValidationOutcome::Invalid),
        }
    }

    fn demo_fallback(
        &self,
        username: &str,
        password: &str,
        err: &SessionError,
    ) -> Option<UserRecord> {
        let demo = self.config.demo_identity.as_ref()?;
        let applies = err.code() == AuthErrorCode::NetworkError
            && demo.username == username
            && demo.password == password;
        if !applies {
            return None;
        }

        tracing::warn!("credential service unreachable; using configured demo identity");
        let expiry = Utc::now() + Duration::seconds(demo.session_ttl_secs);
        let token = format!("demo-{}", uuid::Uuid::now_v7());
        self.machine.dispatch(AuthAction::LoginSucceeded {
            user: demo.user.clone(),
            token,
            expiry,
        });
        Some(demo.user.clone())
    }
}
