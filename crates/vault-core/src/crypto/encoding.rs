//! Storage-safe text encoding for raw bytes (standard base64, padded).

use base64::{engine::general_purpose, Engine as _};

use super::CryptoError;

pub fn encode(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

pub fn decode(text: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(general_purpose::STANDARD.decode(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_keeps_zero_bytes() {
        let bytes = [0u8, 0, 255, 0, 1, 0];
        assert_eq!(decode(&encode(&bytes)).unwrap(), bytes);
        assert_eq!(decode(&encode(&[])).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode("not*base64"), Err(CryptoError::Base64Decode(_))));
    }
}
