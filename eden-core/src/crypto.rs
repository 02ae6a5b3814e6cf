//! Authenticated encryption primitives shared by key wrapping and artifact
//! persistence.
//!
//! Every payload produced here is AES-256-GCM with a fresh random 96-bit
//! nonce prefixed to the ciphertext: `nonce || ciphertext+tag`. The same
//! layout is used for wrapped session keys and for `.enc` artifact siblings,
//! so a single `open` call recovers either.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::error::{EdenError, Result};

/// Symmetric key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// AES-GCM standard nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `key`, returning `nonce || ciphertext+tag`.
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| EdenError::Crypto(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| EdenError::Crypto(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a payload produced by [`seal`].
///
/// # Errors
/// `EdenError::InvalidKeyMaterial` if the payload is truncated, tampered
/// with, or was sealed under a different key.
pub fn open(key: &[u8; KEY_LEN], payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < NONCE_LEN + TAG_LEN {
        return Err(EdenError::InvalidKeyMaterial);
    }

    let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| EdenError::Crypto(e.to_string()))?;

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| EdenError::InvalidKeyMaterial)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(fill: u8) -> [u8; KEY_LEN] {
        [fill; KEY_LEN]
    }

    #[test]
    fn seal_open_round_trips() {
        let key = test_key(7);
        let plaintext = b"this is some secret session data";

        let payload = seal(&key, plaintext).expect("seal");
        assert_eq!(payload.len(), NONCE_LEN + plaintext.len() + TAG_LEN);

        let recovered = open(&key, &payload).expect("open");
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn seal_uses_fresh_nonce_per_call() {
        let key = test_key(1);
        let a = seal(&key, b"same input").expect("seal a");
        let b = seal(&key, b"same input").expect("seal b");
        assert_ne!(a, b, "two seals of the same plaintext must differ");
    }

    #[test]
    fn open_rejects_wrong_key() {
        let payload = seal(&test_key(2), b"payload").expect("seal");
        let err = open(&test_key(3), &payload).unwrap_err();
        assert!(matches!(err, EdenError::InvalidKeyMaterial));
    }

    #[test]
    fn open_rejects_tampered_payload() {
        let key = test_key(4);
        let mut payload = seal(&key, b"payload").expect("seal");
        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        let err = open(&key, &payload).unwrap_err();
        assert!(matches!(err, EdenError::InvalidKeyMaterial));
    }

    #[test]
    fn open_rejects_truncated_payload() {
        let err = open(&test_key(5), b"short").unwrap_err();
        assert!(matches!(err, EdenError::InvalidKeyMaterial));
    }
}
