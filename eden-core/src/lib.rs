//! # eden-core
//!
//! Session lifecycle, key management, result aggregation and secure
//! persistence for the Eden Recorder.
//!
//! ## Architecture
//!
//! ```text
//! host thread                        producer threads (host-owned)
//! ───────────                        ─────────────────────────────
//! SessionManager ── consent gate     AudioSource ──► full_audio.wav + levels
//!     │                              Transcription ─┐
//!     ├─ start: dirs, session key,   Diarization ───┼─► crossbeam channels
//!     │         wrap, producers      Emotion ───────┘
//!     │
//!     ├─ tick (every POLL_INTERVAL): ResultAggregator drains channels,
//!     │         redacts transcript segments, fills the SessionStore
//!     │
//!     └─ stop: final drain ► persist artifacts (plaintext + .enc)
//!              ► assemble + persist manifest ► reset to Idle
//! ```
//!
//! Encryption is envelope-style: each session gets a fresh random key,
//! wrapped under the password-derived master key; artifacts are sealed
//! under the session key only while the wrapped blob exists as the
//! decryption path. Without a master key the recorder runs in explicit
//! plaintext-only mode.
//!
//! Everything user-facing (dialogs, capture devices, speech models,
//! redaction NLP) lives behind the [`collab`] traits; this crate is a
//! local, single-process trust and persistence layer with no network
//! transport.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod audit;
pub mod collab;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod manifest;
pub mod persist;
pub mod session;
pub mod types;

// Convenience re-exports for downstream crates
pub use audit::{AuditKind, AuditLog};
pub use collab::Collaborators;
pub use config::EdenConfig;
pub use error::EdenError;
pub use keys::{derive_master_key, MasterKey, SessionKey, FIXED_SALT};
pub use manifest::SessionManifest;
pub use session::{SessionManager, SessionState, POLL_INTERVAL};
