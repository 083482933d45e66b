//! Content cipher: AES-256-GCM with a 16-byte initialization vector.
//!
//! Each version record gets its own random IV, persisted next to the record
//! and reused for every later decryption of it.

use std::fmt;

use aes_gcm::{
    aead::{consts::U16, Aead, KeyInit},
    aes::Aes256,
    AesGcm, Nonce,
};
use chanstore_core::IV_LEN;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, Result};

/// Length of an organization key.
pub const KEY_LEN: usize = 32;

/// AES-256-GCM with a 128-bit nonce.
type ContentCipher = AesGcm<Aes256, U16>;

/// A tenant's 256-bit symmetric key.
#[derive(Clone, PartialEq, Eq)]
pub struct OrgKey([u8; KEY_LEN]);

impl OrgKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| AccessError::InvalidKeyLength {
            expected: KEY_LEN,
            got: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Short, non-reversible identifier safe to log.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::derive_key("chanstore-org-key-fingerprint-v1", &self.0);
        hex::encode(&hash[..8])
    }

    /// Encrypt data with this key.
    pub fn encrypt(&self, plaintext: &[u8], iv: &InitVector) -> Result<Vec<u8>> {
        let cipher = ContentCipher::new_from_slice(&self.0)
            .map_err(|e| AccessError::Encryption(e.to_string()))?;

        cipher
            .encrypt(Nonce::<U16>::from_slice(&iv.0), plaintext)
            .map_err(|e| AccessError::Encryption(e.to_string()))
    }

    /// Decrypt data with this key.
    pub fn decrypt(&self, ciphertext: &[u8], iv: &InitVector) -> Result<Vec<u8>> {
        let cipher = ContentCipher::new_from_slice(&self.0)
            .map_err(|e| AccessError::Decryption(e.to_string()))?;

        cipher
            .decrypt(Nonce::<U16>::from_slice(&iv.0), ciphertext)
            .map_err(|e| AccessError::Decryption(e.to_string()))
    }
}

impl fmt::Debug for OrgKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrgKey({})", self.fingerprint())
    }
}

/// A per-record initialization vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitVector(pub [u8; IV_LEN]);

impl InitVector {
    /// Generate a new random IV.
    pub fn generate() -> Self {
        let mut bytes = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

/// Ciphertext together with the IV that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedContent {
    pub iv: InitVector,
    /// Includes the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl SealedContent {
    /// Encrypt plaintext under a fresh IV.
    pub fn seal(plaintext: &[u8], key: &OrgKey) -> Result<Self> {
        let iv = InitVector::generate();
        let ciphertext = key.encrypt(plaintext, &iv)?;
        Ok(Self { iv, ciphertext })
    }

    pub fn open(&self, key: &OrgKey) -> Result<Vec<u8>> {
        key.decrypt(&self.ciphertext, &self.iv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = OrgKey::generate();
        let iv = InitVector::generate();
        let plaintext = b"{\"kind\":\"ConfigMap\"}";

        let ciphertext = key.encrypt(plaintext, &iv).unwrap();
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let decrypted = key.decrypt(&ciphertext, &iv).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let sealed = SealedContent::seal(b"secret", &OrgKey::generate()).unwrap();
        assert!(sealed.open(&OrgKey::generate()).is_err());
    }

    #[test]
    fn test_decrypt_wrong_iv_fails() {
        let key = OrgKey::generate();
        let sealed = SealedContent::seal(b"secret", &key).unwrap();
        assert!(key.decrypt(&sealed.ciphertext, &InitVector::generate()).is_err());
    }

    #[test]
    fn test_fresh_iv_per_seal() {
        let key = OrgKey::generate();
        let a = SealedContent::seal(b"same", &key).unwrap();
        let b = SealedContent::seal(b"same", &key).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_from_slice_checks_length() {
        assert!(matches!(
            OrgKey::from_slice(&[0u8; 16]),
            Err(AccessError::InvalidKeyLength { expected: 32, got: 16 })
        ));
        assert!(OrgKey::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = OrgKey::from_bytes([0xab; KEY_LEN]);
        let debug = format!("{:?}", key);
        assert!(!debug.contains("abab"));
        assert_eq!(debug, format!("OrgKey({})", key.fingerprint()));
    }

    proptest! {
        #[test]
        fn roundtrip_any_plaintext(
            key in any::<[u8; 32]>(),
            iv in any::<[u8; 16]>(),
            plaintext in prop::collection::vec(any::<u8>(), 0..2048),
        ) {
            let key = OrgKey::from_bytes(key);
            let iv = InitVector::from_bytes(iv);
            let ciphertext = key.encrypt(&plaintext, &iv).unwrap();
            prop_assert_eq!(key.decrypt(&ciphertext, &iv).unwrap(), plaintext);
        }
    }
}
