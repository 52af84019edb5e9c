use thiserror::Error;

use crate::crypto::CryptoError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Vault is already initialized; unlock or wipe it instead")]
    AlreadyInitialized,

    #[error("Vault has not been initialized")]
    NotInitialized,

    #[error("Wrong password")]
    WrongPassword,

    /// Correct password but the sealed data did not authenticate or parse.
    /// Never repaired automatically.
    #[error("Vault data could not be decrypted and may be unrecoverable: {0}")]
    CorruptVault(String),

    #[error("Vault is locked; unlock with password first")]
    VaultLocked,

    /// Only raised inside session restore, which downgrades it to `Locked`.
    #[error("Session restore failed: {0}")]
    SessionRestoreFailed(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AeadDecrypt
            | CryptoError::Truncated { .. }
            | CryptoError::Base64Decode(_)
            | CryptoError::UnknownKdfVersion(_) => VaultError::CorruptVault(err.to_string()),
            other => VaultError::Crypto(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failures_are_corruption() {
        assert!(matches!(
            VaultError::from(CryptoError::AeadDecrypt),
            VaultError::CorruptVault(_)
        ));
        assert!(matches!(
            VaultError::from(CryptoError::Truncated { len: 3 }),
            VaultError::CorruptVault(_)
        ));
        assert!(matches!(
            VaultError::from(CryptoError::KeyDerivation("oom".into())),
            VaultError::Crypto(_)
        ));
    }
}
