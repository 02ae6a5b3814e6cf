use std::path::PathBuf;

use thiserror::Error;

/// All errors produced by eden-core.
///
/// Only `ConsentDenied` and `DirectoryCreation` abort a session start; every
/// per-artifact failure is reported through
/// [`ArtifactStatus`](crate::persist::ArtifactStatus) instead of an error so
/// one bad artifact never takes down its siblings.
#[derive(Debug, Error)]
pub enum EdenError {
    #[error("recording cannot start without consent")]
    ConsentDenied,

    #[error("failed to create session directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no master key available for key wrapping")]
    KeyUnavailable,

    #[error("wrapped key blob is corrupt or the master key does not match")]
    InvalidKeyMaterial,

    #[error("encryption error: {0}")]
    Crypto(String),

    #[error("audit log unavailable at {path}: {source}")]
    AuditUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("no recording session is active")]
    NotRecording,

    #[error("audio source error: {0}")]
    AudioSource(String),

    #[error("producer error: {0}")]
    Producer(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EdenError>;
