//! Process-local [`SecretStore`]. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::{SecretStore, StoreError};

/// Clones share the same map, so a test can keep a handle and inspect what
/// the session persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek at a slot.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

#[async_trait::async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
        Ok(())
    }
}
