//! The durable, sealed form of a compartment.
//!
//! A record is four string keys under a compartment prefix. Either all four
//! are present or none are; anything in between is treated as corruption.

use tracing::warn;

use crate::crypto::{encoding, KdfVersion};
use crate::error::VaultError;
use crate::storage::KeyValueStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVaultRecord {
    pub salt: Vec<u8>,
    pub password_verifier: String,
    pub kdf_version: KdfVersion,
    pub ciphertext: String,
}

/// Durable key names of one compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordKeys {
    pub salt: &'static str,
    pub password_verifier: &'static str,
    pub kdf_version: &'static str,
    pub ciphertext: &'static str,
}

pub const MAIN_RECORD: RecordKeys = RecordKeys {
    salt: "vault.salt",
    password_verifier: "vault.passwordVerifier",
    kdf_version: "vault.kdfVersion",
    ciphertext: "vault.ciphertext",
};

pub const PERSONAL_RECORD: RecordKeys = RecordKeys {
    salt: "personalVault.salt",
    password_verifier: "personalVault.passwordVerifier",
    kdf_version: "personalVault.kdfVersion",
    ciphertext: "personalVault.ciphertext",
};

impl RecordKeys {
    pub fn all(&self) -> [&'static str; 4] {
        [self.salt, self.password_verifier, self.kdf_version, self.ciphertext]
    }

    /// True if any part of a record is present.
    pub async fn exists(&self, store: &dyn KeyValueStore) -> Result<bool, VaultError> {
        for key in self.all() {
            if store.get(key).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn load(&self, store: &dyn KeyValueStore) -> Result<Option<StoredVaultRecord>, VaultError> {
        let salt = store.get(self.salt).await?;
        let verifier = store.get(self.password_verifier).await?;
        let version = store.get(self.kdf_version).await?;
        let ciphertext = store.get(self.ciphertext).await?;

        match (salt, verifier, version, ciphertext) {
            (None, None, None, None) => Ok(None),
            (Some(salt), Some(password_verifier), Some(version), Some(ciphertext)) => {
                Ok(Some(StoredVaultRecord {
                    salt: encoding::decode(&salt)?,
                    password_verifier,
                    kdf_version: KdfVersion::from_tag(&version)?,
                    ciphertext,
                }))
            }
            _ => {
                warn!(prefix = self.salt, "incomplete vault record in durable storage");
                Err(VaultError::CorruptVault("incomplete vault record".into()))
            }
        }
    }

    pub async fn save(&self, store: &dyn KeyValueStore, record: &StoredVaultRecord) -> Result<(), VaultError> {
        store
            .set_many(&[
                (self.salt, encoding::encode(&record.salt)),
                (self.password_verifier, record.password_verifier.clone()),
                (self.kdf_version, record.kdf_version.tag().to_string()),
                (self.ciphertext, record.ciphertext.clone()),
            ])
            .await?;
        Ok(())
    }

    /// Replace only the sealed payload; salt, verifier and version are unchanged.
    pub async fn save_ciphertext(&self, store: &dyn KeyValueStore, ciphertext: &str) -> Result<(), VaultError> {
        store.set(self.ciphertext, ciphertext).await?;
        Ok(())
    }

    pub async fn remove(&self, store: &dyn KeyValueStore) -> Result<(), VaultError> {
        // Ciphertext first: a half-finished wipe must not leave a decryptable record.
        store.remove(self.ciphertext).await?;
        store.remove(self.salt).await?;
        store.remove(self.password_verifier).await?;
        store.remove(self.kdf_version).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn sample() -> StoredVaultRecord {
        StoredVaultRecord {
            salt: vec![0, 1, 2, 0],
            password_verifier: "dmVyaWZpZXI=".into(),
            kdf_version: KdfVersion::V1,
            ciphertext: "Y2lwaGVy".into(),
        }
    }

    #[tokio::test]
    async fn save_load_remove() {
        let store = MemoryStore::new();
        assert!(MAIN_RECORD.load(&store).await.unwrap().is_none());
        MAIN_RECORD.save(&store, &sample()).await.unwrap();
        assert!(MAIN_RECORD.exists(&store).await.unwrap());
        assert!(!PERSONAL_RECORD.exists(&store).await.unwrap());
        assert_eq!(MAIN_RECORD.load(&store).await.unwrap(), Some(sample()));
        assert_eq!(
            store.get("vault.kdfVersion").await.unwrap().as_deref(),
            Some("pbkdf2-sha256-v1")
        );
        MAIN_RECORD.remove(&store).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_version_is_corruption_not_legacy() {
        let store = MemoryStore::new();
        PERSONAL_RECORD.save(&store, &sample()).await.unwrap();
        store.remove("personalVault.kdfVersion").await.unwrap();
        assert!(matches!(
            PERSONAL_RECORD.load(&store).await,
            Err(VaultError::CorruptVault(_))
        ));
        assert!(PERSONAL_RECORD.exists(&store).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_version_tag_is_corruption() {
        let store = MemoryStore::new();
        MAIN_RECORD.save(&store, &sample()).await.unwrap();
        store.set("vault.kdfVersion", "rot13").await.unwrap();
        assert!(matches!(
            MAIN_RECORD.load(&store).await,
            Err(VaultError::CorruptVault(_))
        ));
    }

    #[test]
    fn compartments_do_not_overlap() {
        for main in MAIN_RECORD.all() {
            assert!(!PERSONAL_RECORD.all().contains(&main));
            assert!(!main.starts_with("personalVault."));
        }
    }
}
