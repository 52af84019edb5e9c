//! Key-value persistence adapter.
//!
//! Two tiers: *durable* (survives restarts, holds the sealed records) and
//! *ephemeral* (short-lived, holds nothing but the personal vault's session
//! key). Vault managers talk only to [`KeyValueStore`]; the backing engine is
//! picked by whoever builds the [`Storage`].

use std::sync::Arc;

use async_trait::async_trait;

mod error;
mod file;
mod keyring_store;
mod memory;

pub use error::StorageError;
pub use file::FileStore;
pub use keyring_store::KeyringStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Write several keys. Backends that can do so apply the batch atomically.
    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }
}

/// The two storage tiers handed to a vault manager.
#[derive(Clone)]
pub struct Storage {
    durable: Arc<dyn KeyValueStore>,
    ephemeral: Arc<dyn KeyValueStore>,
}

impl Storage {
    pub fn new(durable: Arc<dyn KeyValueStore>, ephemeral: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, ephemeral }
    }

    /// Both tiers in process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    pub fn durable(&self) -> &dyn KeyValueStore {
        self.durable.as_ref()
    }

    pub fn ephemeral(&self) -> &dyn KeyValueStore {
        self.ephemeral.as_ref()
    }
}
