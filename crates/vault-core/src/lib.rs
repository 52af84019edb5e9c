//! vault-core — local encrypted vault with two compartments
//!
//! # Compartments
//! - [`MainVault`]: persona, chat history and settings. Unlocked once per
//!   session, stays unlocked until an explicit lock.
//! - [`PersonalVault`]: categorized PII entries behind a separate password,
//!   with an inactivity auto-lock and an ephemeral session key so a reload
//!   does not force a re-prompt.
//!
//! # Encryption strategy
//! - The password is stretched with Argon2id (PBKDF2-SHA256 for legacy
//!   records) and split with HKDF into an encryption key and a verifier.
//! - The plaintext is serialized to JSON and sealed with XChaCha20-Poly1305;
//!   the record's salt is embedded in the ciphertext and bound as AAD.
//! - Keys and plaintext live in memory only while unlocked.
//!
//! The two compartments share nothing but the [`Storage`] they are handed,
//! and never read or write each other's keys.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod main_vault;
pub mod model;
pub mod personal_vault;
pub mod record;
mod sealed;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, SystemClock};
pub use config::VaultConfig;
pub use crypto::{CryptoProvider, KdfVersion, SystemCryptoProvider};
pub use error::VaultError;
pub use events::{Compartment, LockReason, VaultEvent, VaultEventKind, VaultStatus};
pub use main_vault::MainVault;
pub use model::{
    EntryCategory, EntryMetadata, EntryPatch, Message, NewEntry, PersonalVaultData, PersonalVaultEntry, Role,
    VaultData,
};
pub use personal_vault::PersonalVault;
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore, Storage};
