//! Password key derivation.
//!
//! A password is stretched once per unlock with the algorithm named by the
//! record's [`KdfVersion`]. The 32-byte stretched secret is then expanded with
//! HKDF-SHA256 into two independent outputs: the AEAD key and the password
//! verifier. The verifier never sees the AEAD key.

use std::fmt;

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{encoding, CryptoError};

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;

/// PBKDF2 rounds for [`KdfVersion::V1`]. Frozen: changing it locks out V1 vaults.
pub const PBKDF2_ROUNDS: u32 = 100_000;

// Argon2id parameters for V2 (interactive desktop use).
pub const ARGON2_M_COST: u32 = 64 * 1024;
pub const ARGON2_T_COST: u32 = 3;
pub const ARGON2_P_COST: u32 = 1;

const INFO_ENCRYPTION: &[u8] = b"vault-encryption-key";
const INFO_VERIFIER: &[u8] = b"vault-password-verifier";

/// Key derivation algorithm and parameter set a record was sealed with.
///
/// Variants are ordered oldest first, so `a < b` means `a` is weaker.
/// New parameterizations get a new variant; existing ones never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KdfVersion {
    /// PBKDF2-HMAC-SHA256, 100k rounds.
    #[serde(rename = "pbkdf2-sha256-v1")]
    V1,
    /// Argon2id, 64 MiB, 3 passes, 1 lane.
    #[serde(rename = "argon2id-v2")]
    V2,
}

impl KdfVersion {
    pub const CURRENT: KdfVersion = KdfVersion::V2;

    pub fn tag(self) -> &'static str {
        match self {
            KdfVersion::V1 => "pbkdf2-sha256-v1",
            KdfVersion::V2 => "argon2id-v2",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, CryptoError> {
        match tag {
            "pbkdf2-sha256-v1" => Ok(KdfVersion::V1),
            "argon2id-v2" => Ok(KdfVersion::V2),
            other => Err(CryptoError::UnknownKdfVersion(other.to_string())),
        }
    }
}

impl Default for KdfVersion {
    fn default() -> Self {
        KdfVersion::CURRENT
    }
}

impl fmt::Display for KdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// 32-byte compartment key. Zeroized on drop, never printed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; KEY_LEN]);

impl VaultKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", bytes.len())))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey(<redacted>)")
    }
}

/// Encoded password verifier as stored in the durable record.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordVerifier(String);

impl PasswordVerifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Constant-time comparison against a stored verifier string.
    pub fn matches(&self, stored: &str) -> bool {
        self.0.as_bytes().ct_eq(stored.as_bytes()).into()
    }
}

impl fmt::Debug for PasswordVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordVerifier(..)")
    }
}

/// Output of one password stretch.
#[derive(Debug)]
pub struct DerivedKeys {
    pub key: VaultKey,
    pub verifier: PasswordVerifier,
}

fn stretch(
    password: &str,
    salt: &[u8],
    version: KdfVersion,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    match version {
        KdfVersion::V1 => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut out[..]);
        }
        KdfVersion::V2 => {
            let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(KEY_LEN))
                .map_err(|e| CryptoError::KeyDerivation(format!("argon2 params: {e}")))?;
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password_into(password.as_bytes(), salt, &mut out[..])
                .map_err(|e| CryptoError::KeyDerivation(format!("argon2 derive: {e}")))?;
        }
    }
    Ok(out)
}

fn expand(stretched: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, stretched);
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(info, &mut out[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(out)
}

/// Split already-stretched key material into the AEAD key and the verifier.
///
/// Exposed so alternative [`CryptoProvider`](super::CryptoProvider)s share the
/// same separation.
pub fn split_stretched(stretched: &[u8]) -> Result<DerivedKeys, CryptoError> {
    let key = expand(stretched, INFO_ENCRYPTION)?;
    let verifier = expand(stretched, INFO_VERIFIER)?;
    Ok(DerivedKeys {
        key: VaultKey::from_bytes(*key),
        verifier: PasswordVerifier(encoding::encode(&verifier[..])),
    })
}

/// Stretch once and return both the AEAD key and the verifier.
pub fn derive_key_and_verifier(
    password: &str,
    salt: &[u8],
    version: KdfVersion,
) -> Result<DerivedKeys, CryptoError> {
    let stretched = stretch(password, salt, version)?;
    split_stretched(&stretched[..])
}

pub fn derive_key(password: &str, salt: &[u8], version: KdfVersion) -> Result<VaultKey, CryptoError> {
    Ok(derive_key_and_verifier(password, salt, version)?.key)
}

pub fn hash_password(
    password: &str,
    salt: &[u8],
    version: KdfVersion,
) -> Result<PasswordVerifier, CryptoError> {
    Ok(derive_key_and_verifier(password, salt, version)?.verifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: [u8; SALT_LEN] = [7u8; SALT_LEN];

    #[test]
    fn v1_is_deterministic() {
        let a = derive_key_and_verifier("correct-horse", &SALT, KdfVersion::V1).unwrap();
        let b = derive_key_and_verifier("correct-horse", &SALT, KdfVersion::V1).unwrap();
        assert_eq!(a.key.as_bytes(), b.key.as_bytes());
        assert_eq!(a.verifier, b.verifier);
    }

    #[test]
    fn v2_is_deterministic() {
        let a = derive_key("correct-horse", &SALT, KdfVersion::V2).unwrap();
        let b = derive_key("correct-horse", &SALT, KdfVersion::V2).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn versions_and_salts_give_distinct_keys() {
        let v1 = derive_key("pw", &SALT, KdfVersion::V1).unwrap();
        let v2 = derive_key("pw", &SALT, KdfVersion::V2).unwrap();
        let other_salt = derive_key("pw", &[8u8; SALT_LEN], KdfVersion::V1).unwrap();
        assert_ne!(v1.as_bytes(), v2.as_bytes());
        assert_ne!(v1.as_bytes(), other_salt.as_bytes());
    }

    #[test]
    fn verifier_is_not_the_key() {
        let derived = derive_key_and_verifier("pw", &SALT, KdfVersion::V1).unwrap();
        let key_text = encoding::encode(derived.key.as_bytes());
        assert_ne!(derived.verifier.as_str(), key_text);
        assert_eq!(
            hash_password("pw", &SALT, KdfVersion::V1).unwrap(),
            derived.verifier
        );
    }

    #[test]
    fn verifier_matching() {
        let verifier = hash_password("pw", &SALT, KdfVersion::V1).unwrap();
        assert!(verifier.matches(verifier.as_str()));
        assert!(!verifier.matches("AAAA"));
        assert!(!verifier.matches(""));
    }

    #[test]
    fn version_tags() {
        for version in [KdfVersion::V1, KdfVersion::V2] {
            assert_eq!(KdfVersion::from_tag(version.tag()).unwrap(), version);
        }
        assert!(matches!(
            KdfVersion::from_tag("scrypt-v9"),
            Err(CryptoError::UnknownKdfVersion(_))
        ));
        assert!(KdfVersion::V1 < KdfVersion::V2);
        assert_eq!(
            serde_json::to_string(&KdfVersion::V2).unwrap(),
            "\"argon2id-v2\""
        );
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = VaultKey::from_bytes([42u8; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "VaultKey(<redacted>)");
        assert!(VaultKey::from_slice(&[1, 2, 3]).is_err());
    }
}
