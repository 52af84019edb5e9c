//! Salt-bound authenticated encryption.
//!
//! XChaCha20-Poly1305, 32-byte key, random 24-byte nonce per call.
//!
//! Ciphertext wire format (base64 as a whole):
//!   [ salt (salt_len) | nonce (24 bytes) | ciphertext + tag (16 bytes) ]
//!
//! The salt travels in the clear and is also fed to the AEAD as associated
//! data, so swapping it for another record's salt breaks authentication.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng, Payload},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroizing;

use super::{encoding, CryptoError, VaultKey};

pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

const AAD_DOMAIN: &[u8] = b"vault-aead-v1\0";

fn associated_data(salt: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_DOMAIN.len() + salt.len());
    aad.extend_from_slice(AAD_DOMAIN);
    aad.extend_from_slice(salt);
    aad
}

pub fn encrypt_with_salt(plaintext: &[u8], key: &VaultKey, salt: &[u8]) -> Result<String, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::AeadEncrypt)?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);
    let aad = associated_data(salt);
    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad: &aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;

    let mut out = Vec::with_capacity(salt.len() + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(encoding::encode(&out))
}

pub fn decrypt_with_salt(
    ciphertext: &str,
    key: &VaultKey,
    salt_len: usize,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let data = encoding::decode(ciphertext)?;
    if data.len() < salt_len + NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Truncated { len: data.len() });
    }
    let (salt, rest) = data.split_at(salt_len);
    let (nonce, sealed) = rest.split_at(NONCE_LEN);

    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::AeadDecrypt)?;
    let aad = associated_data(salt);
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: sealed, aad: &aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SALT_LEN;

    fn key(byte: u8) -> VaultKey {
        VaultKey::from_bytes([byte; 32])
    }

    #[test]
    fn roundtrip() {
        let salt = [3u8; SALT_LEN];
        for plaintext in [&b""[..], b"hello", &[0u8; 1024][..]] {
            let sealed = encrypt_with_salt(plaintext, &key(1), &salt).unwrap();
            let opened = decrypt_with_salt(&sealed, &key(1), SALT_LEN).unwrap();
            assert_eq!(opened.as_slice(), plaintext);
        }
    }

    #[test]
    fn nonces_are_fresh() {
        let salt = [3u8; SALT_LEN];
        let a = encrypt_with_salt(b"same", &key(1), &salt).unwrap();
        let b = encrypt_with_salt(b"same", &key(1), &salt).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn every_flipped_byte_is_rejected() {
        let salt = [9u8; SALT_LEN];
        let sealed = encrypt_with_salt(b"{\"entries\":[]}", &key(5), &salt).unwrap();
        let raw = encoding::decode(&sealed).unwrap();
        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let result = decrypt_with_salt(&encoding::encode(&tampered), &key(5), SALT_LEN);
            assert!(
                matches!(result, Err(CryptoError::AeadDecrypt)),
                "byte {i} was accepted"
            );
        }
    }

    #[test]
    fn wrong_key_and_truncation_fail_closed() {
        let salt = [9u8; SALT_LEN];
        let sealed = encrypt_with_salt(b"secret", &key(5), &salt).unwrap();
        assert!(matches!(
            decrypt_with_salt(&sealed, &key(6), SALT_LEN),
            Err(CryptoError::AeadDecrypt)
        ));

        let raw = encoding::decode(&sealed).unwrap();
        let short = encoding::encode(&raw[..SALT_LEN + NONCE_LEN + 4]);
        assert!(matches!(
            decrypt_with_salt(&short, &key(5), SALT_LEN),
            Err(CryptoError::Truncated { .. })
        ));
        let dropped_tail = encoding::encode(&raw[..raw.len() - 1]);
        assert!(decrypt_with_salt(&dropped_tail, &key(5), SALT_LEN).is_err());
    }
}
