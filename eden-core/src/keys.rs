//! Key manager: master-key derivation, session-key generation and wrapping.
//!
//! ## Key hierarchy
//!
//! ```text
//! password ──PBKDF2-HMAC-SHA256──► MasterKey (process lifetime, never persisted)
//!                                      │
//! OsRng ───────────────────────► SessionKey (one per session)
//!                                      │
//!                            wrap_session_key = seal(session key, master key)
//!                                      │
//!                            session_key.wrapped (persisted blob)
//! ```
//!
//! The master key gates all encryption: without it no session key can be
//! wrapped, and without a wrapped (recoverable) session key no artifact is
//! encrypted. Key bytes never reach the audit log — only event names and
//! success booleans do.

use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{self, KEY_LEN};
use crate::error::{EdenError, Result};

/// Installation-wide KDF salt. A fixed salt keeps derivation deterministic
/// across restarts, which is what lets a stored password re-open old
/// sessions; per-installation salts are a deployment concern, not ours.
pub const FIXED_SALT: &[u8] = b"_eden_recorder_fixed_salt_v1.0_";

/// PBKDF2 iteration count. Deliberately slow so offline brute force against
/// a leaked wrapped-key blob stays expensive. Derivation happens once per
/// process, so the cost is paid exactly once.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Process-lifetime symmetric key derived from the user's password.
///
/// Immutable once derived; wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Per-session symmetric key. Exclusively owned by its session and wiped
/// when the session is discarded.
///
/// Deliberately carries no `PartialEq`: comparing key material byte-wise is
/// never needed outside tests, and a derived comparison would not be
/// constant-time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Derive the master key from a password.
///
/// Returns `None` — not an error — for an empty or whitespace-only password:
/// the recorder then runs in plaintext-only mode for the whole process.
/// Deterministic: the same password and salt always yield the same key.
pub fn derive_master_key(password: &str, salt: &[u8]) -> Option<MasterKey> {
    if password.trim().is_empty() {
        return None;
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    Some(MasterKey(key))
}

/// Generate a fresh random session key.
pub fn generate_session_key() -> SessionKey {
    let mut key = [0u8; KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    SessionKey(key)
}

/// Wrap (encrypt) a session key under the master key for persistence.
///
/// # Errors
/// `EdenError::KeyUnavailable` if no master key is present.
pub fn wrap_session_key(key: &SessionKey, master: Option<&MasterKey>) -> Result<Vec<u8>> {
    let master = master.ok_or(EdenError::KeyUnavailable)?;
    crypto::seal(master.as_bytes(), key.as_bytes())
}

/// Unwrap a blob produced by [`wrap_session_key`].
///
/// # Errors
/// `EdenError::InvalidKeyMaterial` on a corrupt blob or wrong master key.
pub fn unwrap_session_key(blob: &[u8], master: &MasterKey) -> Result<SessionKey> {
    let raw = crypto::open(master.as_bytes(), blob)?;
    let bytes: [u8; KEY_LEN] = raw
        .as_slice()
        .try_into()
        .map_err(|_| EdenError::InvalidKeyMaterial)?;
    Ok(SessionKey(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_master_key("correct horse battery staple", FIXED_SALT).expect("derive a");
        let b = derive_master_key("correct horse battery staple", FIXED_SALT).expect("derive b");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_salt_changes_the_key() {
        let a = derive_master_key("pw", FIXED_SALT).expect("derive a");
        let b = derive_master_key("pw", b"another_salt_entirely").expect("derive b");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn empty_password_yields_no_key() {
        assert!(derive_master_key("", FIXED_SALT).is_none());
        assert!(derive_master_key("   ", FIXED_SALT).is_none());
    }

    #[test]
    fn wrap_unwrap_round_trips() {
        let master = derive_master_key("pw", FIXED_SALT).expect("derive");
        let session = generate_session_key();

        let blob = wrap_session_key(&session, Some(&master)).expect("wrap");
        let recovered = unwrap_session_key(&blob, &master).expect("unwrap");
        assert_eq!(recovered.as_bytes(), session.as_bytes());
    }

    #[test]
    fn wrap_without_master_key_fails() {
        let session = generate_session_key();
        let err = wrap_session_key(&session, None).unwrap_err();
        assert!(matches!(err, EdenError::KeyUnavailable));
    }

    #[test]
    fn unwrap_with_wrong_master_key_fails() {
        let master = derive_master_key("pw", FIXED_SALT).expect("derive");
        let other = derive_master_key("other", FIXED_SALT).expect("derive other");
        let session = generate_session_key();

        let blob = wrap_session_key(&session, Some(&master)).expect("wrap");
        let err = unwrap_session_key(&blob, &other).unwrap_err();
        assert!(matches!(err, EdenError::InvalidKeyMaterial));
    }

    #[test]
    fn session_keys_are_independent() {
        assert_ne!(
            generate_session_key().as_bytes(),
            generate_session_key().as_bytes()
        );
    }
}
