//! Encrypted directory-backed [`SecretStore`].
//!
//! Fallback for hosts without a usable OS keychain. One file per key inside
//! a directory readable only by the owner (`0700` on unix), each file
//! written `0600`. Slot contents are sealed with AES-256-GCM under a
//! caller-held [`StoreKey`], with the slot name bound as associated data so
//! files cannot be swapped between slots. On-disk layout is
//! `[nonce (12 bytes)][ciphertext + tag]`.
//!
//! Writes go to a temp file first and are renamed into place, so a slot is
//! either the old value or the new one.

#[cfg(test)]
#[path = "file_test.rs"]
mod file_test;

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use tokio::io::AsyncWriteExt;

use super::{SecretStore, StoreError};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

// =============================================================================
// KEY
// =============================================================================

/// 256-bit sealing key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreKey([u8; KEY_LEN]);

impl StoreKey {
    /// Fresh random key from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Parse 64 hex characters. Surrounding whitespace is ignored.
    #[must_use]
    pub fn from_hex(raw: &str) -> Option<Self> {
        let bytes = hex::decode(raw.trim()).ok()?;
        <[u8; KEY_LEN]>::try_from(bytes).ok().map(Self)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoreKey(..)")
    }
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Clone)]
pub struct FileStore {
    dir: PathBuf,
    cipher: Aes256Gcm,
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore").field("dir", &self.dir).finish_non_exhaustive()
    }
}

impl FileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, key: &StoreKey) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
        Self { dir: dir.into(), cipher }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_key(key) {
            return Err(StoreError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(key))
    }

    async fn ensure_dir(&self) -> Result<(), StoreError> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(&self.dir).await?;
        Ok(())
    }

    fn seal(&self, key: &str, value: &str) -> Result<Vec<u8>, StoreError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, Payload { msg: value.as_bytes(), aad: key.as_bytes() })
            .map_err(|e| StoreError::Crypto(format!("seal {key}: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, key: &str, sealed: &[u8]) -> Result<String, StoreError> {
        if sealed.len() < NONCE_LEN {
            return Err(StoreError::Crypto(format!("{key}: truncated")));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad: key.as_bytes() })
            .map_err(|_| StoreError::Crypto(format!("{key}: wrong key or tampered")))?;
        String::from_utf8(plaintext).map_err(|e| StoreError::Crypto(format!("{key}: {e}")))
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[async_trait::async_trait]
impl SecretStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.slot_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(sealed) => self.open(key, &sealed).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.slot_path(key)?;
        let sealed = self.seal(key, value)?;
        self.ensure_dir().await?;

        let tmp = self.dir.join(format!(".{key}.tmp"));
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp).await?;
        file.write_all(&sealed).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.slot_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
