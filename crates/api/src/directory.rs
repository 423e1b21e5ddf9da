//! Account lookup and credential checking, behind narrow traits.
//!
//! The account store is externally owned; the gate only needs to resolve a
//! subject and read the active flag. The in-memory implementation backs
//! tests and single-process deployments.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

use masthead_core::{UserId, UserRecord};

/// Infrastructure failure while consulting the account store. Distinct from
/// "account not found": this means we could not check.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, DirectoryError>;

    async fn find_by_username(&self, username: &str)
    -> Result<Option<UserRecord>, DirectoryError>;

    async fn list(&self) -> Result<Vec<UserRecord>, DirectoryError>;

    /// Register a new account. Credentials are provisioned separately by the
    /// issuance collaborator.
    async fn create(&self, user: UserRecord) -> Result<UserRecord, DirectoryError>;
}

/// Username/password check for the issuance route.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// `Ok(None)` means the credentials were rejected; `Err` means we could
    /// not check them.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, DirectoryError>;
}

/// HashMap-backed directory for tests and single-process deployments.
///
/// Passwords are stored as SHA-256 digests keyed by username. The
/// `unavailable` switch simulates an infrastructure outage so the
/// `AUTHENTICATION_ERROR` path stays testable.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, UserRecord>>,
    passwords: RwLock<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an account with a password.
    pub fn seed(&self, user: UserRecord, password: &str) {
        if let Ok(mut passwords) = self.passwords.write() {
            passwords.insert(user.username.clone(), Self::digest(password));
        }
        if let Ok(mut users) = self.users.write() {
            users.insert(user.id, user);
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DirectoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(DirectoryError::Unavailable("simulated outage".into()))
        } else {
            Ok(())
        }
    }

    fn digest(password: &str) -> String {
        hex::encode(Sha256::digest(password.as_bytes()))
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, DirectoryError> {
        self.check_available()?;
        Ok(self
            .users
            .read()
            .ok()
            .and_then(|users| users.get(&id).cloned()))
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, DirectoryError> {
        self.check_available()?;
        Ok(self.users.read().ok().and_then(|users| {
            users
                .values()
                .find(|user| user.username == username)
                .cloned()
        }))
    }

    async fn list(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        self.check_available()?;
        let mut users: Vec<UserRecord> = self
            .users
            .read()
            .map(|users| users.values().cloned().collect())
            .unwrap_or_default();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn create(&self, user: UserRecord) -> Result<UserRecord, DirectoryError> {
        self.check_available()?;
        if let Ok(mut users) = self.users.write() {
            users.insert(user.id, user.clone());
        }
        Ok(user)
    }
}

#[async_trait]
impl CredentialSource for InMemoryUserDirectory {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, DirectoryError> {
        self.check_available()?;

        let stored = self
            .passwords
            .read()
            .ok()
            .and_then(|passwords| passwords.get(username).cloned());
        let Some(stored) = stored else {
            return Ok(None);
        };
        if stored != Self::digest(password) {
            return Ok(None);
        }
        self.find_by_username(username).await
    }
}
