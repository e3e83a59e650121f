//! OS keychain [`SecretStore`].
//!
//! Each slot is a generic-password item under one service name: Keychain
//! Services on macOS, Credential Manager on Windows, the kernel keyring
//! (keyutils) on Linux. Keychain calls block, so they run on the blocking
//! pool.

#[cfg(test)]
#[path = "keychain_test.rs"]
mod keychain_test;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use keyring::Entry;

use super::{SecretStore, StoreError};

pub const DEFAULT_SERVICE: &str = "smartdt";

/// Clones share the same entry handles.
#[derive(Clone)]
pub struct KeyringStore {
    service: String,
    entries: Arc<Mutex<HashMap<String, Arc<Entry>>>>,
}

impl fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyringStore").field("service", &self.service).finish_non_exhaustive()
    }
}

impl KeyringStore {
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into(), entries: Arc::default() }
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<Arc<Entry>, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(key) {
            return Ok(Arc::clone(entry));
        }
        let entry = Arc::new(Entry::new(&self.service, key)?);
        entries.insert(key.to_owned(), Arc::clone(&entry));
        Ok(entry)
    }

    async fn blocking<T, F>(&self, key: &str, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Entry) -> keyring::Result<T> + Send + 'static,
    {
        let entry = self.entry(key)?;
        let result = tokio::task::spawn_blocking(move || op(&entry))
            .await
            .map_err(|e| StoreError::Backend(format!("keychain task failed: {e}")))?;
        Ok(result?)
    }
}

#[async_trait::async_trait]
impl SecretStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.blocking(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let value = value.to_owned();
        self.blocking(key, move |entry| entry.set_password(&value)).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.blocking(key, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
    }
}
