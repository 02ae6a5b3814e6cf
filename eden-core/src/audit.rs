//! Append-only audit log: one JSON object per line, flushed per event.
//!
//! Two instances exist at runtime: a process-wide log opened once at
//! startup (lifecycle events, key status, shutdown) and a session-scoped
//! log opened at session start (consent, every save/encrypt attempt and
//! outcome). Audit failures are best-effort by policy — they are traced to
//! the application log and never abort the caller's workflow.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::error;

use crate::error::{EdenError, Result};

/// Audit event vocabulary. Serialized as `SCREAMING_SNAKE_CASE` strings so
/// logs stay grep-able and stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    AppStart,
    AppShutdown,
    MasterKeyDerived,
    MasterKeyNotProvided,
    UserConsentGranted,
    UserConsentDenied,
    RecordingStarted,
    RecordingStopped,
    SessionKeyWrapped,
    SessionKeyWrapFailed,
    PiiDetected,
    FileSaved,
    FileSaveFailed,
    FileEncrypted,
    FileEncryptionFailed,
    AiTrainingConsent,
    ManifestWritten,
}

impl AuditKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppStart => "APP_START",
            Self::AppShutdown => "APP_SHUTDOWN",
            Self::MasterKeyDerived => "MASTER_KEY_DERIVED",
            Self::MasterKeyNotProvided => "MASTER_KEY_NOT_PROVIDED",
            Self::UserConsentGranted => "USER_CONSENT_GRANTED",
            Self::UserConsentDenied => "USER_CONSENT_DENIED",
            Self::RecordingStarted => "RECORDING_STARTED",
            Self::RecordingStopped => "RECORDING_STOPPED",
            Self::SessionKeyWrapped => "SESSION_KEY_WRAPPED",
            Self::SessionKeyWrapFailed => "SESSION_KEY_WRAP_FAILED",
            Self::PiiDetected => "PII_DETECTED",
            Self::FileSaved => "FILE_SAVED",
            Self::FileSaveFailed => "FILE_SAVE_FAILED",
            Self::FileEncrypted => "FILE_ENCRYPTED",
            Self::FileEncryptionFailed => "FILE_ENCRYPTION_FAILED",
            Self::AiTrainingConsent => "AI_TRAINING_CONSENT",
            Self::ManifestWritten => "MANIFEST_WRITTEN",
        }
    }
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only structured event sink.
///
/// `AuditLog` is `Send + Sync`; the file handle is guarded by a mutex so a
/// process-wide instance can be shared across threads.
pub struct AuditLog {
    path: PathBuf,
    file: Option<Mutex<File>>,
}

impl AuditLog {
    /// Create parent directories as needed and open `path` for append.
    ///
    /// # Errors
    /// `EdenError::AuditUnavailable` on any I/O failure. Callers for whom
    /// auditing is best-effort should fall back to [`AuditLog::disabled`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| {
                    EdenError::AuditUnavailable {
                        path: path.clone(),
                        source,
                    }
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| EdenError::AuditUnavailable {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            file: Some(Mutex::new(file)),
        })
    }

    /// A log that records nothing. Used when opening the real sink failed
    /// and policy says the primary workflow must continue.
    pub fn disabled(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event line: `{"timestamp": ..., "action": ..., "details": ...}`.
    ///
    /// Each call is flushed independently so no event is lost to buffering
    /// on a crash. Write failures are traced and swallowed.
    pub fn log_action(&self, kind: AuditKind, details: Value) {
        let Some(file) = &self.file else {
            return;
        };

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "action": kind.as_str(),
            "details": details,
        });

        let mut line = entry.to_string();
        line.push('\n');

        let mut guard = file.lock();
        if let Err(e) = guard.write_all(line.as_bytes()).and_then(|()| guard.flush()) {
            error!("audit write to {:?} failed ({e}); event {} dropped", self.path, kind);
        }
    }
}
