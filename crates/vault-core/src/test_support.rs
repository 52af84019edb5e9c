//! Fakes shared by the unit tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha512};
use tokio::sync::{watch, Notify};
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::crypto::{aead, kdf, CryptoError, CryptoProvider, DerivedKeys, KdfVersion, VaultKey};
use crate::storage::{KeyValueStore, MemoryStore, StorageError};

/// Shared by every `FastCrypto`, so two providers never hand out the same salt.
static RANDOM_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Real AEAD, cheap SHA-512 "KDF", counter-based salts. Keeps tests fast and
/// repeatable without weakening the production provider.
#[derive(Debug, Default)]
pub(crate) struct FastCrypto;

pub(crate) fn fast_crypto() -> Arc<dyn CryptoProvider> {
    Arc::new(FastCrypto)
}

impl CryptoProvider for FastCrypto {
    fn derive(&self, password: &str, salt: &[u8], version: KdfVersion) -> Result<DerivedKeys, CryptoError> {
        let mut hasher = Sha512::new();
        hasher.update(version.tag().as_bytes());
        hasher.update([0u8]);
        hasher.update(salt);
        hasher.update([0u8]);
        hasher.update(password.as_bytes());
        let digest = hasher.finalize();
        kdf::split_stretched(&digest[..32])
    }

    fn aead_encrypt(&self, key: &VaultKey, salt: &[u8], plaintext: &[u8]) -> Result<String, CryptoError> {
        aead::encrypt_with_salt(plaintext, key, salt)
    }

    fn aead_decrypt(
        &self,
        key: &VaultKey,
        ciphertext: &str,
        salt_len: usize,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        aead::decrypt_with_salt(ciphertext, key, salt_len)
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let n = RANDOM_COUNTER.fetch_add(1, Ordering::SeqCst) + 1;
        n.to_le_bytes().iter().copied().cycle().take(len).collect()
    }
}

/// Wall clock that follows tokio time, so `start_paused` tests can move
/// persisted deadlines as well as timers.
#[derive(Debug)]
pub(crate) struct TokioClock {
    wall_origin: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub(crate) fn new() -> Self {
        Self {
            wall_origin: Utc::now(),
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + elapsed
    }
}

/// Memory store whose `set` fails for one key. Leaves `set_many` to the
/// trait's one-key-at-a-time default, like backends without batch writes.
#[derive(Debug)]
pub(crate) struct RejectingStore {
    pub(crate) inner: MemoryStore,
    rejected: &'static str,
}

impl RejectingStore {
    pub(crate) fn new(rejected: &'static str) -> Self {
        Self {
            inner: MemoryStore::new(),
            rejected,
        }
    }
}

#[async_trait]
impl KeyValueStore for RejectingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if key == self.rejected {
            return Err(StorageError::Keyring(format!("store {key}: access denied")));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }
}

/// Memory store that remembers every key it was asked about.
#[derive(Debug, Default)]
pub(crate) struct RecordingStore {
    pub(crate) inner: MemoryStore,
    touched: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn touched(&self) -> Vec<String> {
        self.touched.lock().clone()
    }

    fn note(&self, key: &str) {
        self.touched.lock().push(key.to_string());
    }
}

#[async_trait]
impl KeyValueStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.note(key);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.note(key);
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.note(key);
        self.inner.remove(key).await
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        for (key, _) in entries {
            self.note(key);
        }
        self.inner.set_many(entries).await
    }
}

/// Memory store whose writes can be held at a gate, to park a mutation
/// half-way through.
pub(crate) struct GatedStore {
    inner: MemoryStore,
    gate: watch::Sender<bool>,
    blocked: Notify,
}

impl GatedStore {
    pub(crate) fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: MemoryStore::new(),
            gate,
            blocked: Notify::new(),
        }
    }

    pub(crate) fn close(&self) {
        self.gate.send_replace(false);
    }

    pub(crate) fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Resolves once a write is parked at the closed gate.
    pub(crate) async fn wait_for_blocked_write(&self) {
        self.blocked.notified().await;
    }

    async fn pass(&self) {
        let mut rx = self.gate.subscribe();
        let mut notified = false;
        loop {
            let open = *rx.borrow_and_update();
            if open {
                return;
            }
            if !notified {
                self.blocked.notify_one();
                notified = true;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for GatedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.pass().await;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        self.pass().await;
        self.inner.set_many(entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separate_providers_never_repeat_salts() {
        let (a, b) = (fast_crypto(), fast_crypto());
        let first = a.random_bytes(16);
        let second = b.random_bytes(16);
        assert_ne!(first, second);
        assert_ne!(a.random_bytes(16), first);
    }
}
