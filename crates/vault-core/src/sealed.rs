//! Unsealed compartment state and the seal/unseal steps both managers share.

use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::crypto::{CryptoProvider, KdfVersion, VaultKey, SALT_LEN};
use crate::error::VaultError;
use crate::record::StoredVaultRecord;

/// Key, salt and plaintext of an unlocked compartment. Lives only in memory;
/// the key is zeroized when this is dropped.
pub(crate) struct Unsealed<T> {
    pub(crate) key: VaultKey,
    pub(crate) salt: Vec<u8>,
    pub(crate) kdf_version: KdfVersion,
    pub(crate) data: T,
}

impl<T: Serialize + DeserializeOwned> Unsealed<T> {
    /// Fresh salt, fresh key, initial plaintext. Returns the record to persist.
    pub(crate) fn create(
        crypto: &dyn CryptoProvider,
        password: &str,
        kdf_version: KdfVersion,
        data: T,
    ) -> Result<(Self, StoredVaultRecord), VaultError> {
        let salt = crypto.random_bytes(SALT_LEN);
        let derived = crypto.derive(password, &salt, kdf_version)?;
        let unsealed = Self {
            key: derived.key,
            salt,
            kdf_version,
            data,
        };
        let record = StoredVaultRecord {
            salt: unsealed.salt.clone(),
            password_verifier: derived.verifier.into_string(),
            kdf_version,
            ciphertext: unsealed.seal(crypto, &unsealed.data)?,
        };
        Ok((unsealed, record))
    }

    /// Verify the password, then decrypt and parse the record.
    pub(crate) fn open(
        crypto: &dyn CryptoProvider,
        record: &StoredVaultRecord,
        password: &str,
    ) -> Result<Self, VaultError> {
        let derived = crypto.derive(password, &record.salt, record.kdf_version)?;
        if !derived.verifier.matches(&record.password_verifier) {
            return Err(VaultError::WrongPassword);
        }
        Self::with_key(crypto, record, derived.key)
    }

    /// Decrypt and parse with an already-derived key (session restore).
    pub(crate) fn with_key(
        crypto: &dyn CryptoProvider,
        record: &StoredVaultRecord,
        key: VaultKey,
    ) -> Result<Self, VaultError> {
        let plaintext = crypto.aead_decrypt(&key, &record.ciphertext, record.salt.len())?;
        let data = serde_json::from_slice(&plaintext).map_err(|e| payload_error(&e))?;
        Ok(Self {
            key,
            salt: record.salt.clone(),
            kdf_version: record.kdf_version,
            data,
        })
    }

    /// Encrypt `data` under this compartment's key and salt.
    pub(crate) fn seal(&self, crypto: &dyn CryptoProvider, data: &T) -> Result<String, VaultError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(data)?);
        Ok(crypto.aead_encrypt(&self.key, &self.salt, &plaintext)?)
    }

    /// Re-salt and re-key under `password` at `kdf_version`, keeping the data.
    /// `self` stays valid until the caller has persisted the new record.
    pub(crate) fn rekey(
        &self,
        crypto: &dyn CryptoProvider,
        password: &str,
        kdf_version: KdfVersion,
    ) -> Result<(Self, StoredVaultRecord), VaultError>
    where
        T: Clone,
    {
        Self::create(crypto, password, kdf_version, self.data.clone())
    }
}

/// serde_json messages can quote the offending value; keep only where and what kind.
fn payload_error(e: &serde_json::Error) -> VaultError {
    VaultError::CorruptVault(format!(
        "vault payload does not parse ({:?} error at line {} column {})",
        e.classify(),
        e.line(),
        e.column()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PersonalVaultData;
    use crate::test_support::fast_crypto;

    #[test]
    fn parse_failure_does_not_echo_plaintext() {
        let crypto = fast_crypto();
        let (unsealed, mut record) =
            Unsealed::create(crypto.as_ref(), "pw", KdfVersion::V2, PersonalVaultData::default()).unwrap();
        let payload = br#"{"entries":[{"id":"x","category":"financial","label":"Card","value":4111111111111111}]}"#;
        record.ciphertext = crypto.aead_encrypt(&unsealed.key, &unsealed.salt, payload).unwrap();

        let err = match Unsealed::<PersonalVaultData>::open(crypto.as_ref(), &record, "pw") {
            Err(err) => err,
            Ok(_) => panic!("payload with a numeric value parsed"),
        };
        assert!(matches!(err, VaultError::CorruptVault(_)));
        let message = err.to_string();
        assert!(!message.contains("4111"), "{message}");
        assert!(message.contains("line 1"), "{message}");
    }
}
