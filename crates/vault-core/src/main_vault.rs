//! Main vault: persona, chat history and settings.
//!
//! The coarser compartment. Unlocked only by password, no auto-lock, and no
//! session survives a reload: dropping the last handle zeroizes the key.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::config::VaultConfig;
use crate::crypto::CryptoProvider;
use crate::error::VaultError;
use crate::events::{Compartment, EventBus, LockReason, VaultEvent, VaultEventKind, VaultStatus};
use crate::model::VaultData;
use crate::record::MAIN_RECORD;
use crate::sealed::Unsealed;
use crate::storage::Storage;

/// Handle to the main compartment. Clone to share; all clones see the same
/// state and serialize their operations on one internal mutex.
#[derive(Clone)]
pub struct MainVault {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Storage,
    crypto: Arc<dyn CryptoProvider>,
    config: VaultConfig,
    state: Mutex<Option<Unsealed<VaultData>>>,
    snapshot: RwLock<Option<Arc<VaultData>>>,
    events: EventBus,
}

impl MainVault {
    pub fn new(storage: Storage, crypto: Arc<dyn CryptoProvider>, config: VaultConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                crypto,
                config,
                state: Mutex::new(None),
                snapshot: RwLock::new(None),
                events: EventBus::new(Compartment::Main),
            }),
        }
    }

    /// Last decrypted plaintext, `None` while locked.
    pub fn read(&self) -> Option<Arc<VaultData>> {
        self.inner.snapshot.read().clone()
    }

    pub fn is_unlocked(&self) -> bool {
        self.inner.snapshot.read().is_some()
    }

    pub async fn is_initialized(&self) -> Result<bool, VaultError> {
        MAIN_RECORD.exists(self.inner.storage.durable()).await
    }

    pub async fn status(&self) -> Result<VaultStatus, VaultError> {
        if self.is_unlocked() {
            Ok(VaultStatus::Unlocked)
        } else if self.is_initialized().await? {
            Ok(VaultStatus::Locked)
        } else {
            Ok(VaultStatus::Uninitialized)
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.inner.events.subscribe()
    }

    pub async fn initialize(&self, password: &str) -> Result<(), VaultError> {
        let mut state = self.inner.state.lock().await;
        let store = self.inner.storage.durable();
        if MAIN_RECORD.exists(store).await? {
            return Err(VaultError::AlreadyInitialized);
        }
        let (unsealed, record) = Unsealed::create(
            self.inner.crypto.as_ref(),
            password,
            self.inner.config.kdf_version,
            VaultData::default(),
        )?;
        MAIN_RECORD.save(store, &record).await?;
        info!(compartment = "main", kdf = %record.kdf_version, "vault initialized");
        self.publish(&mut state, unsealed);
        Ok(())
    }

    pub async fn unlock(&self, password: &str) -> Result<(), VaultError> {
        let mut state = self.inner.state.lock().await;
        let store = self.inner.storage.durable();
        let record = MAIN_RECORD.load(store).await?.ok_or(VaultError::NotInitialized)?;
        let crypto = self.inner.crypto.as_ref();
        let mut unsealed = Unsealed::open(crypto, &record, password)?;

        let target = self.inner.config.kdf_version;
        if self.inner.config.upgrade_kdf_on_unlock && record.kdf_version < target {
            let (upgraded, new_record) = unsealed.rekey(crypto, password, target)?;
            match MAIN_RECORD.save(store, &new_record).await {
                Ok(()) => {
                    info!(compartment = "main", from = %record.kdf_version, to = %target, "vault re-keyed");
                    unsealed = upgraded;
                }
                Err(e) => warn!(compartment = "main", error = %e, "kdf upgrade skipped"),
            }
        }

        info!(compartment = "main", "vault unlocked");
        self.publish(&mut state, unsealed);
        Ok(())
    }

    /// Apply `f` to a copy of the plaintext, seal and persist it, then make it
    /// current. The write is durable when this returns; on error nothing
    /// changes.
    pub async fn mutate<F, R>(&self, f: F) -> Result<R, VaultError>
    where
        F: FnOnce(&mut VaultData) -> R,
    {
        let mut state = self.inner.state.lock().await;
        let current = state.as_mut().ok_or(VaultError::VaultLocked)?;
        let mut draft = current.data.clone();
        let out = f(&mut draft);
        let ciphertext = current.seal(self.inner.crypto.as_ref(), &draft)?;
        MAIN_RECORD
            .save_ciphertext(self.inner.storage.durable(), &ciphertext)
            .await?;
        current.data = draft;
        *self.inner.snapshot.write() = Some(Arc::new(current.data.clone()));
        Ok(out)
    }

    /// Re-key under `new_password`. Works locked or unlocked; leaves the
    /// vault unlocked.
    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<(), VaultError> {
        let mut state = self.inner.state.lock().await;
        let store = self.inner.storage.durable();
        let record = MAIN_RECORD.load(store).await?.ok_or(VaultError::NotInitialized)?;
        let crypto = self.inner.crypto.as_ref();
        let unsealed = Unsealed::open(crypto, &record, current_password)?;
        let (rekeyed, new_record) = unsealed.rekey(crypto, new_password, self.inner.config.kdf_version)?;
        MAIN_RECORD.save(store, &new_record).await?;
        info!(compartment = "main", kdf = %rekeyed.kdf_version, previous = %unsealed.kdf_version, "vault password changed");
        self.publish(&mut state, rekeyed);
        Ok(())
    }

    /// Drop the key and plaintext. Idempotent; waits for an in-flight
    /// mutation to finish first.
    pub async fn lock(&self) {
        let mut state = self.inner.state.lock().await;
        if self.clear(&mut state) {
            info!(compartment = "main", "vault locked");
            self.inner.events.emit(VaultEventKind::Locked(LockReason::Explicit));
        }
    }

    /// Delete the durable record and lock. Irreversible.
    pub async fn wipe(&self) -> Result<(), VaultError> {
        let mut state = self.inner.state.lock().await;
        self.clear(&mut state);
        MAIN_RECORD.remove(self.inner.storage.durable()).await?;
        warn!(compartment = "main", "vault wiped");
        self.inner.events.emit(VaultEventKind::Locked(LockReason::Wiped));
        Ok(())
    }

    fn publish(&self, state: &mut Option<Unsealed<VaultData>>, unsealed: Unsealed<VaultData>) {
        *self.inner.snapshot.write() = Some(Arc::new(unsealed.data.clone()));
        *state = Some(unsealed);
        self.inner.events.emit(VaultEventKind::Unlocked);
    }

    fn clear(&self, state: &mut Option<Unsealed<VaultData>>) -> bool {
        *self.inner.snapshot.write() = None;
        state.take().is_some()
    }
}
