use zeroize::Zeroizing;

use super::{aead, kdf, CryptoError, DerivedKeys, KdfVersion, VaultKey};

/// Everything the vault managers need from a crypto backend.
///
/// Managers never call the primitive modules directly, so a backend can be
/// swapped (or made deterministic for tests) without touching manager logic.
pub trait CryptoProvider: Send + Sync {
    /// Stretch `password` at `version` and split into key + verifier.
    fn derive(&self, password: &str, salt: &[u8], version: KdfVersion) -> Result<DerivedKeys, CryptoError>;

    fn aead_encrypt(&self, key: &VaultKey, salt: &[u8], plaintext: &[u8]) -> Result<String, CryptoError>;

    fn aead_decrypt(
        &self,
        key: &VaultKey,
        ciphertext: &str,
        salt_len: usize,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;

    fn random_bytes(&self, len: usize) -> Vec<u8>;
}

/// Argon2id / PBKDF2 + XChaCha20-Poly1305 from audited RustCrypto crates,
/// randomness from the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCryptoProvider;

impl CryptoProvider for SystemCryptoProvider {
    fn derive(&self, password: &str, salt: &[u8], version: KdfVersion) -> Result<DerivedKeys, CryptoError> {
        kdf::derive_key_and_verifier(password, salt, version)
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
        use rand::RngCore;
        let mut bytes = vec![0u8; len];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        bytes
    }
}
