//! Cryptographic primitives. Nothing outside this module touches raw
//! cipher or KDF state; managers go through [`CryptoProvider`].
//!
//! - `kdf`: versioned password stretching, key/verifier split
//! - `aead`: XChaCha20-Poly1305 bound to the record salt
//! - `encoding`: base64 helpers for storing bytes as text
//! - `provider`: the backend trait and its system implementation

pub mod aead;
pub mod encoding;
mod error;
pub mod kdf;
mod provider;

pub use aead::{decrypt_with_salt, encrypt_with_salt};
pub use error::CryptoError;
pub use kdf::{
    derive_key, derive_key_and_verifier, hash_password, DerivedKeys, KdfVersion,
    PasswordVerifier, VaultKey, KEY_LEN, SALT_LEN,
};
pub use provider::{CryptoProvider, SystemCryptoProvider};
