use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{NONCE_SIZE, SYMMETRIC_KEY_SIZE, TAG_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

/// BLAKE3 digest used for both the plaintext and ciphertext hash of an attachment.
pub type ContentHash = [u8; 32];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Interpret a stored media key. Keys of any other length are rejected.
pub fn key_from_slice(bytes: &[u8]) -> Result<SymmetricKey, CryptoError> {
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength)
}

pub fn content_hash(data: &[u8]) -> ContentHash {
    *blake3::hash(data).as_bytes()
}

/// Constant-time comparison of a computed hash against a stored one.
pub fn hash_matches(expected: &[u8], data: &[u8]) -> bool {
    match <&[u8; 32]>::try_from(expected) {
        Ok(expected) => blake3::Hash::from(*expected) == blake3::hash(data),
        Err(_) => false,
    }
}

/// Size of the ciphertext produced by [`encrypt`] for a plaintext of `len` bytes.
pub fn sealed_len(len: usize) -> usize {
    NONCE_SIZE + len + TAG_SIZE
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_symmetric_key();
        let plaintext = b"voice note bytes";

        let encrypted = encrypt(&key, plaintext).unwrap();
        assert_eq!(encrypted.len(), sealed_len(plaintext.len()));
        assert_eq!(decrypt(&key, &encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = encrypt(&generate_symmetric_key(), b"Secret").unwrap();
        assert!(decrypt(&generate_symmetric_key(), &encrypted).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = generate_symmetric_key();
        let mut encrypted = encrypt(&key, b"Important data").unwrap();
        let len = encrypted.len();
        encrypted[len - 1] ^= 0xFF;

        assert!(decrypt(&key, &encrypted).is_err());
    }

    #[test]
    fn test_short_input_fails() {
        let key = generate_symmetric_key();
        assert!(decrypt(&key, &[]).is_err());
        assert!(decrypt(&key, &[0u8; NONCE_SIZE]).is_err());
    }

    #[test]
    fn test_key_from_slice_checks_length() {
        assert!(key_from_slice(&[7u8; 32]).is_ok());
        assert!(matches!(
            key_from_slice(&[7u8; 31]),
            Err(CryptoError::InvalidKeyLength)
        ));
    }

    #[test]
    fn test_hash_matches() {
        let data = b"attachment";
        let hash = content_hash(data);
        assert!(hash_matches(&hash, data));
        assert!(!hash_matches(&hash, b"other"));
        assert!(!hash_matches(&hash[..16], data));
    }
}
