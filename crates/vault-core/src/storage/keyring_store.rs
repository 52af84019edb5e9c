use async_trait::async_trait;
use keyring::Entry;
use zeroize::Zeroizing;

use super::{KeyValueStore, StorageError};

/// Ephemeral tier backed by the OS credential store.
///
/// Each key becomes one credential under `service`. Used by the CLI so a
/// personal-vault session outlives a single invocation. The session record
/// carries its own expiry and is removed again on lock, wipe, or auto-lock.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(service: &str, key: &str) -> Result<Entry, StorageError> {
        Entry::new(service, key).map_err(|e| StorageError::Keyring(format!("keyring init: {e}")))
    }

    /// Keyring calls block on the platform credential service.
    async fn with_entry<R, F>(&self, key: &str, f: F) -> Result<R, StorageError>
    where
        F: FnOnce(&Entry, &str) -> Result<R, StorageError> + Send + 'static,
        R: Send + 'static,
    {
        let (service, key) = (self.service.clone(), key.to_string());
        tokio::task::spawn_blocking(move || f(&Self::entry(&service, &key)?, &key)).await?
    }
}

#[async_trait]
impl KeyValueStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.with_entry(key, |entry, key| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::Keyring(format!("load {key}: {e}"))),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let value = Zeroizing::new(value.to_string());
        self.with_entry(key, move |entry, key| {
            entry
                .set_password(&value)
                .map_err(|e| StorageError::Keyring(format!("store {key}: {e}")))
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_entry(key, |entry, key| match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::Keyring(format!("delete {key}: {e}"))),
        })
        .await
    }
}
