use super::*;
use crate::net::auth::test_helpers::sample_user;

/// Wraps a [`MemoryStore`] and fails every write to one key.
struct FailingKey {
    inner: MemoryStore,
    key: &'static str,
}

#[async_trait::async_trait]
impl SecretStore for FailingKey {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key == self.key {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if key == self.key {
            return Err(StoreError::Backend("locked".into()));
        }
        self.inner.delete(key).await
    }
}

// =============================================================================
// save / load
// =============================================================================

#[tokio::test]
async fn save_writes_both_slots() {
    let memory = MemoryStore::new();
    let store = CredentialStore::new(memory.clone());
    store.save(&sample_user(1), "T").await.unwrap();

    assert_eq!(memory.peek(TOKEN_KEY).as_deref(), Some("T"));
    let user: User = serde_json::from_str(&memory.peek(USER_KEY).unwrap()).unwrap();
    assert_eq!(user, sample_user(1));
}

#[tokio::test]
async fn load_round_trips_record() {
    let store = CredentialStore::new(MemoryStore::new());
    store.save(&sample_user(1), "T").await.unwrap();
    let record = store.load().await.unwrap().unwrap();
    assert_eq!(record, CredentialRecord { user: sample_user(1), token: "T".into() });
}

#[tokio::test]
async fn load_empty_is_none() {
    let store = CredentialStore::new(MemoryStore::new());
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn half_record_without_token_is_discarded() {
    let memory = MemoryStore::new();
    memory.set(USER_KEY, &serde_json::to_string(&sample_user(1)).unwrap()).await.unwrap();
    let store = CredentialStore::new(memory.clone());

    assert!(store.load().await.unwrap().is_none());
    assert!(memory.is_empty());
}

#[tokio::test]
async fn half_record_without_user_is_discarded() {
    let memory = MemoryStore::new();
    memory.set(TOKEN_KEY, "T").await.unwrap();
    let store = CredentialStore::new(memory.clone());

    assert!(store.load().await.unwrap().is_none());
    assert!(memory.is_empty());
}

#[tokio::test]
async fn undecodable_user_is_discarded() {
    let memory = MemoryStore::new();
    memory.set(USER_KEY, "{not json").await.unwrap();
    memory.set(TOKEN_KEY, "T").await.unwrap();
    let store = CredentialStore::new(memory.clone());

    assert!(store.load().await.unwrap().is_none());
    assert!(memory.is_empty());
}

#[tokio::test]
async fn failed_token_write_rolls_back_user() {
    let memory = MemoryStore::new();
    let store = CredentialStore::new(FailingKey { inner: memory.clone(), key: TOKEN_KEY });

    let err = store.save(&sample_user(1), "T").await.unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));
    assert!(memory.peek(USER_KEY).is_none());
}

// =============================================================================
// token / clear
// =============================================================================

#[tokio::test]
async fn token_reads_token_slot() {
    let store = CredentialStore::new(MemoryStore::new());
    assert!(store.token().await.unwrap().is_none());
    store.save(&sample_user(1), "T").await.unwrap();
    assert_eq!(store.token().await.unwrap().as_deref(), Some("T"));
}

#[tokio::test]
async fn clear_removes_both_slots() {
    let memory = MemoryStore::new();
    let store = CredentialStore::new(memory.clone());
    store.save(&sample_user(1), "T").await.unwrap();
    store.clear().await.unwrap();
    assert!(memory.is_empty());
}

#[tokio::test]
async fn clear_attempts_token_even_if_user_delete_fails() {
    let memory = MemoryStore::new();
    memory.set(USER_KEY, "{}").await.unwrap();
    memory.set(TOKEN_KEY, "T").await.unwrap();
    let store = CredentialStore::new(FailingKey { inner: memory.clone(), key: USER_KEY });

    assert!(store.clear().await.is_err());
    assert!(memory.peek(TOKEN_KEY).is_none());
}

#[tokio::test]
async fn file_store_backs_credential_store() {
    let dir = tempfile::tempdir().unwrap();
    let key = StoreKey::generate();
    let store = CredentialStore::new(FileStore::new(dir.path().join("creds"), &key));
    store.save(&sample_user(3), "T3").await.unwrap();

    let reopened = CredentialStore::new(FileStore::new(dir.path().join("creds"), &key));
    let record = reopened.load().await.unwrap().unwrap();
    assert_eq!(record.user.id, 3);
    assert_eq!(record.token, "T3");
}

// =============================================================================
// open
// =============================================================================

#[tokio::test]
async fn open_encrypted_file_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ClientConfig::with_base_url("http://127.0.0.1:9", dir.path().join("creds"));
    config.store_backend = StoreBackend::EncryptedFile(StoreKey::generate());

    let store = CredentialStore::new(open(&config));
    store.save(&sample_user(4), "T4").await.unwrap();
    assert_eq!(store.token().await.unwrap().as_deref(), Some("T4"));
    assert!(dir.path().join("creds").join(TOKEN_KEY).exists());

    store.clear().await.unwrap();
    assert!(store.load().await.unwrap().is_none());
}
