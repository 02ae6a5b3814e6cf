//! Secure persistence engine.
//!
//! Each logical artifact is written twice: a standard (plaintext) file,
//! always attempted first, and — when a session encryption key is present —
//! an encrypted sibling `<name>.enc` under the session's encrypted
//! directory. Failures are per-artifact: an I/O or crypto error is captured
//! in the returned [`PersistResult`], audited, and never propagated, so one
//! bad artifact cannot abort the stop sequence or its siblings.

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{error, warn};

use crate::audit::{AuditKind, AuditLog};
use crate::crypto;
use crate::keys::SessionKey;

/// Why the encrypted side of an artifact was not attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No recoverable encryption key for this session (no master key, or
    /// the session-key wrap failed). Deliberate, silent-by-design skip.
    EncryptionUnavailable,
    /// The standard write failed, so there is nothing worth encrypting.
    StandardWriteFailed,
}

/// Outcome of one write attempt (standard or encrypted side).
#[derive(Debug, Clone)]
pub enum ArtifactStatus {
    Written(PathBuf),
    IoFailure(String),
    CryptoFailure(String),
    Skipped(SkipReason),
}

impl ArtifactStatus {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Written(path) => Some(path),
            _ => None,
        }
    }
}

/// Per-artifact persistence report.
#[derive(Debug, Clone)]
pub struct PersistResult {
    pub name: String,
    pub standard: ArtifactStatus,
    pub encrypted: ArtifactStatus,
}

impl PersistResult {
    pub fn standard_ok(&self) -> bool {
        self.standard.is_written()
    }

    pub fn encrypted_ok(&self) -> bool {
        self.encrypted.is_written()
    }
}

/// Persist one artifact from in-memory content.
///
/// The standard write is attempted first; if it fails, encryption is
/// skipped for this artifact and the failure is isolated here. With
/// `key = None` the encrypted side is unconditionally
/// `Skipped(EncryptionUnavailable)` and no file is created — a deliberate
/// skip, distinct from an encryption failure. Every save and encryption
/// attempt is recorded in `audit` with its outcome.
pub fn persist_artifact(
    name: &str,
    content: &[u8],
    standard_dir: &Path,
    encrypted_dir: &Path,
    key: Option<&SessionKey>,
    audit: &AuditLog,
) -> PersistResult {
    let standard_path = standard_dir.join(name);

    if let Err(e) = std::fs::write(&standard_path, content) {
        error!("standard write of {name} to {standard_path:?} failed: {e}");
        audit.log_action(
            AuditKind::FileSaveFailed,
            json!({
                "filename": name,
                "path": standard_path.display().to_string(),
                "error": e.to_string(),
            }),
        );
        return PersistResult {
            name: name.to_string(),
            standard: ArtifactStatus::IoFailure(e.to_string()),
            encrypted: ArtifactStatus::Skipped(SkipReason::StandardWriteFailed),
        };
    }

    audit.log_action(
        AuditKind::FileSaved,
        json!({ "filename": name, "path": standard_path.display().to_string() }),
    );

    PersistResult {
        name: name.to_string(),
        standard: ArtifactStatus::Written(standard_path),
        encrypted: encrypt_side(name, content, encrypted_dir, key, audit),
    }
}

/// Persist an artifact whose standard file is already on disk (the
/// live-written audio file, the closed session audit log).
///
/// The existing file is treated as the standard write; only the encrypted
/// sibling is produced here. A missing or unreadable standard file is
/// reported as an `IoFailure` on the standard side.
pub fn persist_encrypted_copy(
    name: &str,
    standard_path: &Path,
    encrypted_dir: &Path,
    key: Option<&SessionKey>,
    audit: &AuditLog,
) -> PersistResult {
    let content = match std::fs::read(standard_path) {
        Ok(content) => content,
        Err(e) => {
            error!("reading {name} back from {standard_path:?} failed: {e}");
            audit.log_action(
                AuditKind::FileSaveFailed,
                json!({
                    "filename": name,
                    "path": standard_path.display().to_string(),
                    "error": e.to_string(),
                }),
            );
            return PersistResult {
                name: name.to_string(),
                standard: ArtifactStatus::IoFailure(e.to_string()),
                encrypted: ArtifactStatus::Skipped(SkipReason::StandardWriteFailed),
            };
        }
    };

    audit.log_action(
        AuditKind::FileSaved,
        json!({ "filename": name, "path": standard_path.display().to_string() }),
    );

    PersistResult {
        name: name.to_string(),
        standard: ArtifactStatus::Written(standard_path.to_path_buf()),
        encrypted: encrypt_side(name, &content, encrypted_dir, key, audit),
    }
}

fn encrypt_side(
    name: &str,
    content: &[u8],
    encrypted_dir: &Path,
    key: Option<&SessionKey>,
    audit: &AuditLog,
) -> ArtifactStatus {
    let Some(key) = key else {
        return ArtifactStatus::Skipped(SkipReason::EncryptionUnavailable);
    };

    let payload = match crypto::seal(key.as_bytes(), content) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("encryption of {name} failed: {e}");
            audit.log_action(
                AuditKind::FileEncryptionFailed,
                json!({ "filename": name, "error": e.to_string() }),
            );
            return ArtifactStatus::CryptoFailure(e.to_string());
        }
    };

    let encrypted_path = encrypted_dir.join(format!("{name}.enc"));
    match std::fs::write(&encrypted_path, payload) {
        Ok(()) => {
            audit.log_action(
                AuditKind::FileEncrypted,
                json!({
                    "filename": name,
                    "path": encrypted_path.display().to_string(),
                    "algorithm": "AES-256-GCM",
                }),
            );
            ArtifactStatus::Written(encrypted_path)
        }
        Err(e) => {
            warn!("encrypted write of {name} to {encrypted_path:?} failed: {e}");
            audit.log_action(
                AuditKind::FileEncryptionFailed,
                json!({
                    "filename": name,
                    "path": encrypted_path.display().to_string(),
                    "error": e.to_string(),
                }),
            );
            ArtifactStatus::IoFailure(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::open;
    use crate::keys::generate_session_key;

    struct Dirs {
        _root: tempfile::TempDir,
        standard: PathBuf,
        encrypted: PathBuf,
    }

    fn session_dirs() -> Dirs {
        let root = tempfile::tempdir().expect("tempdir");
        let standard = root.path().join("standard");
        let encrypted = root.path().join("encrypted");
        std::fs::create_dir_all(&standard).unwrap();
        std::fs::create_dir_all(&encrypted).unwrap();
        Dirs {
            _root: root,
            standard,
            encrypted,
        }
    }

    #[test]
    fn without_key_only_the_standard_file_exists() {
        let dirs = session_dirs();
        let audit = AuditLog::disabled("unused");

        let result = persist_artifact(
            "transcript.txt",
            b"hello",
            &dirs.standard,
            &dirs.encrypted,
            None,
            &audit,
        );

        assert!(result.standard_ok());
        assert!(!result.encrypted_ok());
        assert!(matches!(
            result.encrypted,
            ArtifactStatus::Skipped(SkipReason::EncryptionUnavailable)
        ));
        assert!(dirs.standard.join("transcript.txt").exists());
        assert!(!dirs.encrypted.join("transcript.txt.enc").exists());
    }

    #[test]
    fn with_key_the_encrypted_sibling_decrypts_to_the_standard_content() {
        let dirs = session_dirs();
        let audit = AuditLog::disabled("unused");
        let key = generate_session_key();

        let result = persist_artifact(
            "audio.wav",
            b"pcm-bytes",
            &dirs.standard,
            &dirs.encrypted,
            Some(&key),
            &audit,
        );

        assert!(result.standard_ok());
        assert!(result.encrypted_ok());

        let payload = std::fs::read(dirs.encrypted.join("audio.wav.enc")).unwrap();
        let recovered = open(key.as_bytes(), &payload).expect("decrypt");
        assert_eq!(recovered, b"pcm-bytes");
    }

    #[test]
    fn standard_write_failure_skips_encryption() {
        let dirs = session_dirs();
        let audit = AuditLog::disabled("unused");
        let key = generate_session_key();
        let missing_dir = dirs.standard.join("does-not-exist");

        let result = persist_artifact(
            "a.txt",
            b"x",
            &missing_dir,
            &dirs.encrypted,
            Some(&key),
            &audit,
        );

        assert!(matches!(result.standard, ArtifactStatus::IoFailure(_)));
        assert!(matches!(
            result.encrypted,
            ArtifactStatus::Skipped(SkipReason::StandardWriteFailed)
        ));
        assert!(!dirs.encrypted.join("a.txt.enc").exists());
    }

    #[test]
    fn encrypted_copy_of_existing_file_round_trips() {
        let dirs = session_dirs();
        let audit = AuditLog::disabled("unused");
        let key = generate_session_key();

        let live_path = dirs.standard.join("full_audio.wav");
        std::fs::write(&live_path, b"already-on-disk").unwrap();

        let result =
            persist_encrypted_copy("full_audio.wav", &live_path, &dirs.encrypted, Some(&key), &audit);

        assert!(result.standard_ok());
        assert_eq!(result.standard.path(), Some(live_path.as_path()));
        let payload = std::fs::read(dirs.encrypted.join("full_audio.wav.enc")).unwrap();
        assert_eq!(open(key.as_bytes(), &payload).unwrap(), b"already-on-disk");
    }

    #[test]
    fn encrypted_copy_of_missing_file_reports_io_failure() {
        let dirs = session_dirs();
        let audit = AuditLog::disabled("unused");

        let result = persist_encrypted_copy(
            "gone.wav",
            &dirs.standard.join("gone.wav"),
            &dirs.encrypted,
            None,
            &audit,
        );

        assert!(matches!(result.standard, ArtifactStatus::IoFailure(_)));
        assert!(!result.encrypted_ok());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_directories_are_audited_without_panicking() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = tempfile::tempdir().expect("tempdir");
        let standard = root.path().join(OsStr::from_bytes(b"std\x80\x81"));
        let encrypted = root.path().join(OsStr::from_bytes(b"enc\x80\x81"));
        std::fs::create_dir_all(&standard).unwrap();
        std::fs::create_dir_all(&encrypted).unwrap();
        let audit_path = root.path().join("audit.jsonl");
        let audit = AuditLog::open(&audit_path).expect("audit");
        let key = generate_session_key();

        let result = persist_artifact("t.txt", b"x", &standard, &encrypted, Some(&key), &audit);

        assert!(result.standard_ok());
        assert!(result.encrypted_ok());
        let content = std::fs::read_to_string(&audit_path).unwrap();
        for line in content.lines() {
            let value: serde_json::Value = serde_json::from_str(line).expect("valid json line");
            assert!(value["details"]["path"].is_string());
        }
    }

    #[test]
    fn save_and_encrypt_attempts_are_audited() {
        let dirs = session_dirs();
        let audit_path = dirs.standard.join("audit.jsonl");
        let audit = AuditLog::open(&audit_path).expect("audit");
        let key = generate_session_key();

        persist_artifact(
            "t.txt",
            b"content",
            &dirs.standard,
            &dirs.encrypted,
            Some(&key),
            &audit,
        );

        let content = std::fs::read_to_string(&audit_path).unwrap();
        let actions: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["action"]
                .as_str()
                .unwrap()
                .to_string())
            .collect();
        assert_eq!(actions, vec!["FILE_SAVED", "FILE_ENCRYPTED"]);
    }
}
