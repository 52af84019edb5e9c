//! Ephemeral copy of the personal-vault key, so a reload does not ask for
//! the password again while the session is still live.
//!
//! Derived state only: the durable ciphertext stays the source of truth, and
//! the record is removed on lock, on auto-lock and on wipe. With auto-lock on,
//! the record also carries a wall-clock deadline, so a copy that outlives the
//! process that wrote it (OS keyring) stops working once the inactivity
//! timeout has passed.

use chrono::{DateTime, Utc};
use tracing::warn;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::{encoding, VaultKey};
use crate::error::VaultError;
use crate::storage::KeyValueStore;

pub(crate) const SESSION_KEY: &str = "personalVault.sessionKey";
pub(crate) const SESSION_SALT: &str = "personalVault.sessionSalt";
pub(crate) const SESSION_EXPIRES_AT: &str = "personalVault.sessionExpiresAt";

pub(crate) struct SessionKeyMaterial {
    pub(crate) key: VaultKey,
    pub(crate) salt: Vec<u8>,
    pub(crate) expires_at: Option<DateTime<Utc>>,
}

impl SessionKeyMaterial {
    pub(crate) fn export(key: &VaultKey, salt: &[u8], expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            key: VaultKey::from_bytes(*key.as_bytes()),
            salt: salt.to_vec(),
            expires_at,
        }
    }

    /// Write the whole record. If any part fails, whatever was written is
    /// removed again before the error is returned.
    pub(crate) async fn store(&self, store: &dyn KeyValueStore) -> Result<(), VaultError> {
        let mut entries = vec![
            (SESSION_KEY, encoding::encode(self.key.as_bytes())),
            (SESSION_SALT, encoding::encode(&self.salt)),
        ];
        if let Some(at) = self.expires_at {
            entries.push((SESSION_EXPIRES_AT, at.to_rfc3339()));
        }
        let result = store.set_many(&entries).await;
        entries[0].1.zeroize();
        if let Err(e) = result {
            if let Err(clear_err) = Self::clear(store).await {
                warn!(compartment = "personal", error = %clear_err, "could not scrub partial session");
            }
            return Err(e.into());
        }
        if self.expires_at.is_none() {
            store.remove(SESSION_EXPIRES_AT).await?;
        }
        Ok(())
    }

    /// Push the deadline of an already stored record.
    pub(crate) async fn extend(store: &dyn KeyValueStore, expires_at: DateTime<Utc>) -> Result<(), VaultError> {
        store.set(SESSION_EXPIRES_AT, &expires_at.to_rfc3339()).await?;
        Ok(())
    }

    /// `Ok(None)` when no session was stored. A half-present or undecodable
    /// record is `SessionRestoreFailed`. Error details never quote the record.
    pub(crate) async fn load(store: &dyn KeyValueStore) -> Result<Option<Self>, VaultError> {
        let key = store.get(SESSION_KEY).await?.map(Zeroizing::new);
        let salt = store.get(SESSION_SALT).await?;
        let expires_at = store.get(SESSION_EXPIRES_AT).await?;
        let (key, salt) = match (key, salt) {
            (None, None) => return Ok(None),
            (Some(key), Some(salt)) => (key, salt),
            _ => return Err(VaultError::SessionRestoreFailed("incomplete session record".into())),
        };

        let raw = Zeroizing::new(
            encoding::decode(&key).map_err(|_| restore_failed("session key is not base64"))?,
        );
        let key = VaultKey::from_slice(&raw).map_err(|_| restore_failed("session key has the wrong length"))?;
        let salt = encoding::decode(&salt).map_err(|_| restore_failed("session salt is not base64"))?;
        let expires_at = expires_at
            .map(|at| {
                DateTime::parse_from_rfc3339(&at)
                    .map(|at| at.with_timezone(&Utc))
                    .map_err(|_| restore_failed("session expiry is not a timestamp"))
            })
            .transpose()?;
        Ok(Some(Self { key, salt, expires_at }))
    }

    pub(crate) async fn clear(store: &dyn KeyValueStore) -> Result<(), VaultError> {
        store.remove(SESSION_KEY).await?;
        store.remove(SESSION_SALT).await?;
        store.remove(SESSION_EXPIRES_AT).await?;
        Ok(())
    }
}

fn restore_failed(reason: &str) -> VaultError {
    VaultError::SessionRestoreFailed(reason.to_string())
}
