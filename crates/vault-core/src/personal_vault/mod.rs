//! Personal vault: categorized PII entries behind their own password.
//!
//! Stricter than the main vault in two ways:
//! - the key is kept in ephemeral storage while unlocked, so a reload can
//!   [`restore_session`](PersonalVault::restore_session) without a prompt;
//! - an inactivity timer locks the vault and scrubs that ephemeral copy.
//!
//! Locking (explicit or by timer) takes the same mutex as every mutation, so
//! an in-flight write always completes before the lock lands.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::VaultConfig;
use crate::crypto::CryptoProvider;
use crate::error::VaultError;
use crate::events::{Compartment, EventBus, LockReason, VaultEvent, VaultEventKind, VaultStatus};
use crate::model::{EntryMetadata, EntryPatch, NewEntry, PersonalVaultData, PersonalVaultEntry};
use crate::record::PERSONAL_RECORD;
use crate::sealed::Unsealed;
use crate::storage::Storage;

mod auto_lock;
pub mod search;
mod session;


use auto_lock::AutoLock;
use session::SessionKeyMaterial;

type State = Option<Unsealed<PersonalVaultData>>;

/// Result of an edit closure: whether the draft needs to be sealed and written.
enum Edit<R> {
    Changed(R),
    Unchanged(R),
}

/// Handle to the personal compartment. Clone to share.
#[derive(Clone)]
pub struct PersonalVault {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Storage,
    crypto: Arc<dyn CryptoProvider>,
    config: VaultConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    snapshot: RwLock<Option<Arc<PersonalVaultData>>>,
    auto_lock: AutoLock,
    events: EventBus,
}

impl PersonalVault {
    pub fn new(storage: Storage, crypto: Arc<dyn CryptoProvider>, config: VaultConfig) -> Self {
        Self::with_clock(storage, crypto, config, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new), with a custom source for entry timestamps and
    /// the session deadline.
    pub fn with_clock(
        storage: Storage,
        crypto: Arc<dyn CryptoProvider>,
        config: VaultConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let auto_lock = AutoLock::new(config.auto_lock_after());
        Self {
            inner: Arc::new(Inner {
                storage,
                crypto,
                config,
                clock,
                state: Mutex::new(None),
                snapshot: RwLock::new(None),
                auto_lock,
                events: EventBus::new(Compartment::Personal),
            }),
        }
    }

    /// Construct and try to resume a session from ephemeral storage.
    pub async fn open(storage: Storage, crypto: Arc<dyn CryptoProvider>, config: VaultConfig) -> Self {
        let vault = Self::new(storage, crypto, config);
        vault.restore_session().await;
        vault
    }

    pub fn read(&self) -> Option<Arc<PersonalVaultData>> {
        self.inner.snapshot.read().clone()
    }

    pub fn is_unlocked(&self) -> bool {
        self.inner.snapshot.read().is_some()
    }

    pub async fn is_initialized(&self) -> Result<bool, VaultError> {
        PERSONAL_RECORD.exists(self.inner.storage.durable()).await
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

    /// Time left before auto-lock; `None` while locked or with auto-lock off.
    pub fn auto_lock_remaining(&self) -> Option<Duration> {
        if !self.is_unlocked() {
            return None;
        }
        self.inner.auto_lock.remaining()
    }

    /// User-activity signal: restart the inactivity countdown and push the
    /// session deadline out with it. No-op while locked.
    pub async fn record_activity(&self) -> Result<(), VaultError> {
        let state = self.inner.state.lock().await;
        if state.is_none() {
            return Ok(());
        }
        self.inner.auto_lock.reset();
        self.extend_session().await
    }

    pub async fn initialize(&self, password: &str) -> Result<(), VaultError> {
        let mut state = self.inner.state.lock().await;
        let store = self.inner.storage.durable();
        if PERSONAL_RECORD.exists(store).await? {
            return Err(VaultError::AlreadyInitialized);
        }
        let (unsealed, record) = Unsealed::create(
            self.inner.crypto.as_ref(),
            password,
            self.inner.config.kdf_version,
            PersonalVaultData::default(),
        )?;
        PERSONAL_RECORD.save(store, &record).await?;
        info!(compartment = "personal", kdf = %record.kdf_version, "vault initialized");
        self.become_unlocked(&mut state, unsealed).await
    }

    pub async fn unlock(&self, password: &str) -> Result<(), VaultError> {
        let mut state = self.inner.state.lock().await;
        let store = self.inner.storage.durable();
        let record = PERSONAL_RECORD.load(store).await?.ok_or(VaultError::NotInitialized)?;
        let crypto = self.inner.crypto.as_ref();
        let mut unsealed = Unsealed::open(crypto, &record, password)?;

        let target = self.inner.config.kdf_version;
        if self.inner.config.upgrade_kdf_on_unlock && record.kdf_version < target {
            let (upgraded, new_record) = unsealed.rekey(crypto, password, target)?;
            match PERSONAL_RECORD.save(store, &new_record).await {
                Ok(()) => {
                    info!(compartment = "personal", from = %record.kdf_version, to = %target, "vault re-keyed");
                    unsealed = upgraded;
                }
                Err(e) => warn!(compartment = "personal", error = %e, "kdf upgrade skipped"),
            }
        }

        info!(compartment = "personal", "vault unlocked");
        self.become_unlocked(&mut state, unsealed).await
    }

    /// Resume from the ephemeral session record. Never surfaces an error:
    /// any failure clears the ephemeral record and leaves the vault locked.
    pub async fn restore_session(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.is_some() {
            return true;
        }
        let ephemeral = self.inner.storage.ephemeral();
        if !self.inner.config.persist_session {
            if let Err(e) = SessionKeyMaterial::clear(ephemeral).await {
                warn!(compartment = "personal", error = %e, "could not clear ephemeral session");
            }
            return false;
        }
        match self.try_restore(&mut state).await {
            Ok(restored) => restored,
            Err(e) => {
                let e = match e {
                    VaultError::SessionRestoreFailed(_) => e,
                    other => VaultError::SessionRestoreFailed(other.to_string()),
                };
                debug!(compartment = "personal", error = %e, "falling back to locked");
                if let Err(e) = SessionKeyMaterial::clear(ephemeral).await {
                    warn!(compartment = "personal", error = %e, "could not clear ephemeral session");
                }
                false
            }
        }
    }

    async fn try_restore(&self, state: &mut State) -> Result<bool, VaultError> {
        let Some(session) = SessionKeyMaterial::load(self.inner.storage.ephemeral()).await? else {
            return Ok(false);
        };
        let record = PERSONAL_RECORD
            .load(self.inner.storage.durable())
            .await?
            .ok_or_else(|| VaultError::SessionRestoreFailed("no durable record".into()))?;
        if session.salt != record.salt {
            return Err(VaultError::SessionRestoreFailed("session salt does not match record".into()));
        }
        let now = self.inner.clock.now();
        match session.expires_at {
            Some(deadline) if deadline <= now => {
                return Err(VaultError::SessionRestoreFailed("session expired".into()));
            }
            None if self.inner.config.auto_lock_after().is_some() => {
                return Err(VaultError::SessionRestoreFailed("session has no expiry".into()));
            }
            _ => {}
        }
        let unsealed = Unsealed::with_key(self.inner.crypto.as_ref(), &record, session.key)?;
        info!(compartment = "personal", "session restored");
        self.become_unlocked(state, unsealed).await?;
        Ok(true)
    }

    /// Lock and scrub the ephemeral session. The in-memory key is dropped
    /// even if removing the ephemeral record fails.
    pub async fn lock(&self) -> Result<(), VaultError> {
        let mut state = self.inner.state.lock().await;
        self.inner.auto_lock.disarm();
        if self.clear(&mut state) {
            info!(compartment = "personal", "vault locked");
            self.inner.events.emit(VaultEventKind::Locked(LockReason::Explicit));
        }
        SessionKeyMaterial::clear(self.inner.storage.ephemeral()).await
    }

    /// Remove the durable record and the session, and lock. Irreversible.
    pub async fn wipe(&self) -> Result<(), VaultError> {
        let mut state = self.inner.state.lock().await;
        self.inner.auto_lock.disarm();
        self.clear(&mut state);
        SessionKeyMaterial::clear(self.inner.storage.ephemeral()).await?;
        PERSONAL_RECORD.remove(self.inner.storage.durable()).await?;
        warn!(compartment = "personal", "vault wiped");
        self.inner.events.emit(VaultEventKind::Locked(LockReason::Wiped));
        Ok(())
    }

    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<(), VaultError> {
        let mut state = self.inner.state.lock().await;
        let store = self.inner.storage.durable();
        let record = PERSONAL_RECORD.load(store).await?.ok_or(VaultError::NotInitialized)?;
        let crypto = self.inner.crypto.as_ref();
        let unsealed = Unsealed::open(crypto, &record, current_password)?;
        let (rekeyed, new_record) = unsealed.rekey(crypto, new_password, self.inner.config.kdf_version)?;
        PERSONAL_RECORD.save(store, &new_record).await?;
        info!(compartment = "personal", kdf = %rekeyed.kdf_version, previous = %unsealed.kdf_version, "vault password changed");
        self.become_unlocked(&mut state, rekeyed).await
    }

    // ── Entries ──────────────────────────────────────────────────────────────

    pub async fn add_entry(&self, entry: NewEntry) -> Result<PersonalVaultEntry, VaultError> {
        self.commit(|data, now| {
            let entry = entry.into_entry(now);
            data.entries.push(entry.clone());
            Ok(Edit::Changed(entry))
        })
        .await
    }

    /// Patch an entry in place. `id` and `created_at` are always kept.
    pub async fn update_entry(&self, id: &str, patch: EntryPatch) -> Result<PersonalVaultEntry, VaultError> {
        self.commit(|data, now| {
            let entry = data
                .entries
                .iter_mut()
                .find(|entry| entry.id == id)
                .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))?;
            patch.apply(entry, now);
            Ok(Edit::Changed(entry.clone()))
        })
        .await
    }

    /// Returns `false` (and writes nothing) if no entry had this id.
    pub async fn delete_entry(&self, id: &str) -> Result<bool, VaultError> {
        self.commit(|data, _| {
            let before = data.entries.len();
            data.entries.retain(|entry| entry.id != id);
            if data.entries.len() == before {
                Ok(Edit::Unchanged(false))
            } else {
                Ok(Edit::Changed(true))
            }
        })
        .await
    }

    pub fn entries(&self) -> Result<Vec<PersonalVaultEntry>, VaultError> {
        self.with_data(|data| data.entries.clone())
    }

    pub fn entry(&self, id: &str) -> Result<Option<PersonalVaultEntry>, VaultError> {
        self.with_data(|data| data.entries.iter().find(|entry| entry.id == id).cloned())
    }

    /// Entries without their secret payload.
    pub fn metadata(&self) -> Result<Vec<EntryMetadata>, VaultError> {
        self.with_data(|data| data.entries.iter().map(PersonalVaultEntry::metadata).collect())
    }

    /// Match `query` against label, category, notes and tags. Never `value`.
    pub fn search(&self, query: &str) -> Result<Vec<PersonalVaultEntry>, VaultError> {
        self.with_data(|data| {
            search::search(&data.entries, query)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn with_data<R>(&self, f: impl FnOnce(&PersonalVaultData) -> R) -> Result<R, VaultError> {
        let snapshot = self.inner.snapshot.read();
        let data = snapshot.as_ref().ok_or(VaultError::VaultLocked)?;
        Ok(f(data))
    }

    /// Edit a copy of the entries; if it changed, seal and persist before
    /// making it current. Every successful call restarts the auto-lock timer.
    async fn commit<F, R>(&self, f: F) -> Result<R, VaultError>
    where
        F: FnOnce(&mut PersonalVaultData, DateTime<Utc>) -> Result<Edit<R>, VaultError>,
    {
        let mut state = self.inner.state.lock().await;
        let current = state.as_mut().ok_or(VaultError::VaultLocked)?;
        let mut draft = current.data.clone();
        let out = match f(&mut draft, self.inner.clock.now())? {
            Edit::Unchanged(out) => out,
            Edit::Changed(out) => {
                let ciphertext = current.seal(self.inner.crypto.as_ref(), &draft)?;
                PERSONAL_RECORD
                    .save_ciphertext(self.inner.storage.durable(), &ciphertext)
                    .await?;
                current.data = draft;
                *self.inner.snapshot.write() = Some(Arc::new(current.data.clone()));
                out
            }
        };
        self.inner.auto_lock.reset();
        if let Err(e) = self.extend_session().await {
            warn!(compartment = "personal", error = %e, "could not extend session");
        }
        Ok(out)
    }

    /// Deadline for the ephemeral session: one auto-lock period from now.
    fn session_deadline(&self) -> Option<DateTime<Utc>> {
        let timeout = chrono::Duration::from_std(self.inner.config.auto_lock_after()?).ok()?;
        self.inner.clock.now().checked_add_signed(timeout)
    }

    async fn extend_session(&self) -> Result<(), VaultError> {
        if !self.inner.config.persist_session {
            return Ok(());
        }
        match self.session_deadline() {
            Some(deadline) => SessionKeyMaterial::extend(self.inner.storage.ephemeral(), deadline).await,
            None => Ok(()),
        }
    }

    async fn become_unlocked(&self, state: &mut State, unsealed: Unsealed<PersonalVaultData>) -> Result<(), VaultError> {
        if self.inner.config.persist_session {
            SessionKeyMaterial::export(&unsealed.key, &unsealed.salt, self.session_deadline())
                .store(self.inner.storage.ephemeral())
                .await?;
        }
        *self.inner.snapshot.write() = Some(Arc::new(unsealed.data.clone()));
        *state = Some(unsealed);
        self.arm_auto_lock();
        self.inner.events.emit(VaultEventKind::Unlocked);
        Ok(())
    }

    fn arm_auto_lock(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.auto_lock.arm(move || async move {
            if let Some(inner) = weak.upgrade() {
                PersonalVault { inner }.expire().await;
            }
        });
    }

    /// Timer callback. Runs inside the watcher task.
    async fn expire(&self) {
        let mut state = self.inner.state.lock().await;
        self.inner.auto_lock.detach();
        if state.is_none() {
            return;
        }
        if !self.inner.auto_lock.expired() {
            // a mutation finished while we waited for the mutex
            self.arm_auto_lock();
            return;
        }
        self.clear(&mut state);
        info!(compartment = "personal", "auto-locked after inactivity");
        self.inner.events.emit(VaultEventKind::Locked(LockReason::Inactivity));
        if let Err(e) = SessionKeyMaterial::clear(self.inner.storage.ephemeral()).await {
            warn!(compartment = "personal", error = %e, "could not clear ephemeral session");
        }
    }

    fn clear(&self, state: &mut State) -> bool {
        *self.inner.snapshot.write() = None;
        state.take().is_some()
    }
}
