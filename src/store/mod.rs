//! Secure local persistence of the credential record.
//!
//! DESIGN
//! ======
//! The record lives in two independent slots, `auth_user` (user JSON) and
//! `auth_token` (raw bearer token), behind the [`SecretStore`] key/value
//! seam. [`CredentialStore`] writes and clears them as a pair.
//!
//! TRADE-OFFS
//! ==========
//! Backends offer no transactions, so a crash between the two writes can
//! leave one slot populated. Loading treats any half-present or undecodable
//! record as absent and wipes both slots, failing closed to "logged out".

pub mod file;
pub mod keychain;
pub mod memory;

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;

pub use file::{FileStore, StoreKey};
pub use keychain::KeyringStore;
pub use memory::MemoryStore;

use crate::config::{ClientConfig, StoreBackend};
use crate::net::types::User;

pub const USER_KEY: &str = "auth_user";
pub const TOKEN_KEY: &str = "auth_token";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential encode failed: {0}")]
    Encode(String),
    #[error("invalid store key: {0:?}")]
    InvalidKey(String),
    #[error("sealed slot unreadable: {0}")]
    Crypto(String),
    #[error("keychain failed: {0}")]
    Keychain(#[from] keyring::Error),
    #[error("store backend failed: {0}")]
    Backend(String),
}

/// Key/value storage for secrets. Implementations must keep values out of
/// reach of other users of the machine.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<T: SecretStore + ?Sized> SecretStore for Box<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

/// Open the backend selected by `config`.
#[must_use]
pub fn open(config: &ClientConfig) -> Box<dyn SecretStore> {
    match &config.store_backend {
        StoreBackend::Keychain => Box::new(KeyringStore::new(keychain::DEFAULT_SERVICE)),
        StoreBackend::EncryptedFile(key) => Box::new(FileStore::new(config.store_dir.clone(), key)),
    }
}

/// The persisted pair of user and bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub user: User,
    pub token: String,
}

/// Pairs the two credential slots on top of any [`SecretStore`].
#[derive(Debug, Clone)]
pub struct CredentialStore<S> {
    inner: S,
}

impl<S: SecretStore> CredentialStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Write both slots. If the token write fails the user slot is removed
    /// again so the pair never ends up half-written by this call.
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    pub async fn save(&self, user: &User, token: &str) -> Result<(), StoreError> {
        let user_json = serde_json::to_string(user).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.inner.set(USER_KEY, &user_json).await?;
        if let Err(e) = self.inner.set(TOKEN_KEY, token).await {
            if let Err(rollback) = self.inner.delete(USER_KEY).await {
                tracing::warn!(error = %rollback, "credential rollback failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Read the record. Half-present or undecodable records are cleared and
    /// reported as absent.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backend itself fails to read.
    pub async fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        let user_json = self.inner.get(USER_KEY).await?;
        let token = self.inner.get(TOKEN_KEY).await?;

        match (user_json, token) {
            (None, None) => Ok(None),
            (Some(user_json), Some(token)) => match serde_json::from_str::<User>(&user_json) {
                Ok(user) => Ok(Some(CredentialRecord { user, token })),
                Err(e) => {
                    tracing::warn!(error = %e, "stored user does not decode; discarding credentials");
                    self.discard().await;
                    Ok(None)
                }
            },
            (user_json, token) => {
                tracing::warn!(
                    has_user = user_json.is_some(),
                    has_token = token.is_some(),
                    "half-written credential record; discarding"
                );
                self.discard().await;
                Ok(None)
            }
        }
    }

    /// Current token slot only.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend fails to read.
    pub async fn token(&self) -> Result<Option<String>, StoreError> {
        self.inner.get(TOKEN_KEY).await
    }

    /// Delete both slots. Both deletes are attempted even if the first fails.
    ///
    /// # Errors
    ///
    /// Returns the first delete error.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let user = self.inner.delete(USER_KEY).await;
        let token = self.inner.delete(TOKEN_KEY).await;
        user.and(token)
    }

    async fn discard(&self) {
        if let Err(e) = self.clear().await {
            tracing::warn!(error = %e, "failed to discard credential record");
        }
    }
}
