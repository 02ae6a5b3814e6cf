//! `SessionManager` — session lifecycle controller.
//!
//! ## State machine
//!
//! ```text
//! Idle ──start_recording()──► AwaitingConsent ──granted──► Recording
//!   ▲                              │                            │
//!   └───────denied/cancelled───────┘                            │
//!   ▲                                                           │
//!   └──────────── Finalizing ◄──────────stop_recording()────────┘
//!          (persist artifacts, manifest, reset)
//! ```
//!
//! ## Threading
//!
//! The manager runs on one logical thread. Producers publish into channels
//! from their own threads; the host drives [`SessionManager::tick`] at
//! [`POLL_INTERVAL`] while recording, which drains those channels through
//! the aggregator. Stop signals to producers are best-effort; the final
//! drain in `stop_recording` absorbs any late partial batch before
//! artifacts are read.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use crossbeam_channel::{unbounded, Receiver};
use serde_json::json;
use tracing::{error, info, warn};

use crate::aggregate::{ResultAggregator, SessionStore};
use crate::audit::{AuditKind, AuditLog};
use crate::collab::Collaborators;
use crate::config::EdenConfig;
use crate::error::{EdenError, Result};
use crate::keys::{generate_session_key, wrap_session_key, MasterKey, SessionKey};
use crate::manifest::{self, ConsentRecord, ManifestInputs, SessionManifest};
use crate::persist::{
    persist_artifact, persist_encrypted_copy, ArtifactStatus, PersistResult, SkipReason,
};
use crate::types::TranscriptSegment;

/// Host poll-loop interval while recording. One tick drains every producer
/// queue whose own timer is due.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

const AUDIO_FILE: &str = "full_audio.wav";
const RAW_TRANSCRIPT_FILE: &str = "transcript_raw.txt";
const REDACTED_TRANSCRIPT_FILE: &str = "transcript_redacted.txt";
const WRAPPED_KEY_FILE: &str = "session_key.wrapped";
const SESSION_AUDIT_FILE: &str = "session_audit.jsonl";
const MANIFEST_FILE: &str = "session_manifest.json";

/// Lifecycle states. `AwaitingConsent` and `Finalizing` are only observable
/// from collaborator callbacks — both transitions complete within one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingConsent,
    Recording,
    Finalizing,
}

struct ActiveSession {
    id: String,
    started_at: DateTime<Utc>,
    consent: ConsentRecord,
    session_dir: PathBuf,
    standard_dir: PathBuf,
    encrypted_dir: PathBuf,
    audit: AuditLog,
    session_key: SessionKey,
    /// Present iff the wrap under the master key succeeded; gates all
    /// artifact encryption for this session (envelope encryption — the
    /// wrapped blob is the sole decryption path).
    wrapped_key: Option<Vec<u8>>,
    store: SessionStore,
    aggregator: ResultAggregator,
    audio_path: PathBuf,
    level_rx: Receiver<f32>,
}

/// The session lifecycle controller.
///
/// An explicit value owned by the caller — no process-wide singleton.
/// Constructed with injected collaborators; the master key, if any, is held
/// for the process lifetime and never persisted.
pub struct SessionManager {
    config: EdenConfig,
    master_key: Option<MasterKey>,
    collab: Collaborators,
    process_audit: Arc<AuditLog>,
    state: SessionState,
    active: Option<ActiveSession>,
}

impl SessionManager {
    /// Create the manager and audit the process-wide key status.
    ///
    /// Plaintext-only mode (no master key) is surfaced explicitly as a
    /// `MASTER_KEY_NOT_PROVIDED` event rather than degrading silently.
    pub fn new(
        config: EdenConfig,
        master_key: Option<MasterKey>,
        collab: Collaborators,
        process_audit: Arc<AuditLog>,
    ) -> Self {
        match &master_key {
            Some(_) => process_audit.log_action(
                AuditKind::MasterKeyDerived,
                json!({ "encryption_enabled": true }),
            ),
            None => process_audit.log_action(
                AuditKind::MasterKeyNotProvided,
                json!({ "encryption_enabled": false }),
            ),
        }

        Self {
            config,
            master_key,
            collab,
            process_audit,
            state: SessionState::Idle,
            active: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.id.as_str())
    }

    /// Live audio level samples (RMS) from the capture device, for
    /// host-side metering. Present only while a session is active.
    pub fn level_receiver(&self) -> Option<Receiver<f32>> {
        self.active.as_ref().map(|a| a.level_rx.clone())
    }

    /// Run the consent procedure and, if granted, set up the session and
    /// start every producer.
    ///
    /// # Errors
    /// - `EdenError::AlreadyRecording` outside `Idle`.
    /// - `EdenError::ConsentDenied` if consent was denied or cancelled; no
    ///   session state is created.
    /// - `EdenError::DirectoryCreation` if the session directories cannot
    ///   be created; the partial directory is removed and state reverts to
    ///   `Idle`.
    /// - Audio/producer start failures abort likewise, with best-effort
    ///   cleanup of whatever had already started.
    pub fn start_recording(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(EdenError::AlreadyRecording);
        }

        self.state = SessionState::AwaitingConsent;
        let decision = self.collab.consent.run_consent_procedure();
        if !decision.granted {
            self.process_audit
                .log_action(AuditKind::UserConsentDenied, json!({}));
            self.state = SessionState::Idle;
            return Err(EdenError::ConsentDenied);
        }

        let consent_ts = decision.timestamp.unwrap_or_else(Utc::now);
        let consent = ConsentRecord {
            granted: true,
            timestamp: Some(consent_ts),
            expiry: Some(consent_expiry(consent_ts)),
        };

        let id = new_session_id();
        let session_dir = self.config.sessions_output_dir.join(&id);
        let standard_dir = session_dir.join("standard");
        let encrypted_dir = session_dir.join("encrypted");

        for dir in [&standard_dir, &encrypted_dir] {
            if let Err(source) = std::fs::create_dir_all(dir) {
                let _ = std::fs::remove_dir_all(&session_dir);
                self.state = SessionState::Idle;
                return Err(EdenError::DirectoryCreation {
                    path: dir.clone(),
                    source,
                });
            }
        }

        // Session audit trouble is best-effort by policy: trace it and
        // continue with a disabled sink.
        let audit_path = standard_dir.join(SESSION_AUDIT_FILE);
        let audit = AuditLog::open(&audit_path).unwrap_or_else(|e| {
            error!("session audit log unavailable: {e}");
            AuditLog::disabled(&audit_path)
        });

        audit.log_action(
            AuditKind::UserConsentGranted,
            json!({
                "session_id": id,
                "timestamp": consent_ts.to_rfc3339(),
                "expiry": consent.expiry.map(|e| e.to_rfc3339()),
            }),
        );

        let session_key = generate_session_key();
        let wrapped_key = match wrap_session_key(&session_key, self.master_key.as_ref()) {
            Ok(blob) => {
                audit.log_action(
                    AuditKind::SessionKeyWrapped,
                    json!({ "session_id": id, "blob_len": blob.len() }),
                );
                Some(blob)
            }
            // No master key: plaintext-only mode, already surfaced at startup.
            Err(EdenError::KeyUnavailable) => None,
            Err(e) => {
                // Encryption without a recoverable key would be dead
                // weight, so the whole session degrades to plaintext-only.
                warn!("session key wrap failed ({e}); encryption disabled for this session");
                audit.log_action(
                    AuditKind::SessionKeyWrapFailed,
                    json!({ "session_id": id, "error": e.to_string() }),
                );
                None
            }
        };

        let (level_tx, level_rx) = unbounded();
        let audio_path = standard_dir.join(AUDIO_FILE);
        if let Err(e) = self.collab.audio.start(&audio_path, level_tx) {
            error!("audio capture failed to start: {e}");
            let _ = std::fs::remove_dir_all(&session_dir);
            self.state = SessionState::Idle;
            return Err(e);
        }

        let (diarization_tx, diarization_rx) = unbounded();
        let (transcript_tx, transcript_rx) = unbounded();
        let (emotion_tx, emotion_rx) = unbounded();

        let started = self
            .collab
            .transcription
            .start(&id, transcript_tx)
            .and_then(|()| self.collab.diarization.start(&id, diarization_tx))
            .and_then(|()| self.collab.emotion.start(&id, emotion_tx));
        if let Err(e) = started {
            error!("producer failed to start: {e}");
            self.collab.emotion.stop();
            self.collab.diarization.stop();
            self.collab.transcription.stop();
            let _ = self.collab.audio.stop();
            let _ = std::fs::remove_dir_all(&session_dir);
            self.state = SessionState::Idle;
            return Err(e);
        }

        let started_at = Utc::now();
        audit.log_action(
            AuditKind::RecordingStarted,
            json!({ "session_id": id, "audio_path": audio_path.display().to_string() }),
        );
        info!("recording session {id} started");

        self.active = Some(ActiveSession {
            id,
            started_at,
            consent,
            session_dir,
            standard_dir,
            encrypted_dir,
            audit,
            session_key,
            wrapped_key,
            store: SessionStore::default(),
            aggregator: ResultAggregator::new(diarization_rx, transcript_rx, emotion_rx),
            audio_path,
            level_rx,
        });
        self.state = SessionState::Recording;
        Ok(())
    }

    /// One cooperative poll cycle. A no-op outside `Recording`.
    pub fn tick(&mut self) {
        if self.state != SessionState::Recording {
            return;
        }
        if let Some(active) = self.active.as_mut() {
            active
                .aggregator
                .tick(&mut active.store, self.collab.redactor.as_mut(), &active.audit);
        }
    }

    /// Stop all producers, persist every artifact, assemble and persist the
    /// manifest, and reset to `Idle`.
    ///
    /// Per-artifact failures are isolated (reflected in the manifest and
    /// audit trail); only the absence of an active session is an error.
    pub fn stop_recording(&mut self) -> Result<SessionManifest> {
        if self.state != SessionState::Recording || self.active.is_none() {
            return Err(EdenError::NotRecording);
        }
        self.state = SessionState::Finalizing;

        let Some(ActiveSession {
            id,
            started_at,
            consent,
            session_dir: _session_dir,
            standard_dir,
            encrypted_dir,
            audit,
            session_key,
            wrapped_key,
            mut store,
            mut aggregator,
            audio_path,
            level_rx: _level_rx,
        }) = self.active.take()
        else {
            return Err(EdenError::NotRecording);
        };

        // Best-effort stop signals, reverse order of data flow.
        self.collab.emotion.stop();
        self.collab.diarization.stop();
        self.collab.transcription.stop();
        if let Err(e) = self.collab.audio.stop() {
            error!("audio capture failed to stop cleanly: {e}");
        }

        // Producers may have published a final partial batch after the stop
        // signal; absorb it before any artifact is read.
        aggregator.drain_all(&mut store, self.collab.redactor.as_mut(), &audit);

        let stopped_at = Utc::now();
        let duration = (stopped_at - started_at).num_milliseconds() as f64 / 1000.0;
        audit.log_action(
            AuditKind::RecordingStopped,
            json!({ "session_id": id, "duration_seconds": duration }),
        );
        info!("recording session {id} stopped after {duration:.1}s");

        let speakers = store.speakers();
        let ai_training_consent = self.collab.consent.collect_ai_training_consent(&speakers);
        audit.log_action(
            AuditKind::AiTrainingConsent,
            json!({ "session_id": id, "consents": ai_training_consent }),
        );

        // Envelope encryption: artifacts are sealed under the session key,
        // and only when its wrapped blob exists as the decryption path.
        let enc_key = wrapped_key.as_ref().map(|_| &session_key);

        let mut artifacts: Vec<PersistResult> = Vec::new();
        artifacts.push(persist_encrypted_copy(
            AUDIO_FILE,
            &audio_path,
            &encrypted_dir,
            enc_key,
            &audit,
        ));
        artifacts.push(persist_artifact(
            RAW_TRANSCRIPT_FILE,
            render_transcript(&store.transcript).as_bytes(),
            &standard_dir,
            &encrypted_dir,
            enc_key,
            &audit,
        ));
        artifacts.push(persist_artifact(
            REDACTED_TRANSCRIPT_FILE,
            render_transcript(&store.redacted_transcript).as_bytes(),
            &standard_dir,
            &encrypted_dir,
            enc_key,
            &audit,
        ));

        let mut voice_prints: BTreeMap<String, PersistResult> = BTreeMap::new();
        for (speaker, embedding) in &store.voice_prints {
            let name = format!("voice_print_{}.bin", sanitize_file_stem(speaker));
            let result = persist_artifact(
                &name,
                &embedding_bytes(embedding),
                &standard_dir,
                &encrypted_dir,
                enc_key,
                &audit,
            );
            voice_prints.insert(speaker.clone(), result);
        }

        // The blob is already sealed under the master key; no sibling.
        if let Some(blob) = &wrapped_key {
            artifacts.push(persist_artifact(
                WRAPPED_KEY_FILE,
                blob,
                &standard_dir,
                &encrypted_dir,
                None,
                &audit,
            ));
        }

        // Close the session audit log before it becomes an artifact itself;
        // its persistence events go to the process-wide log.
        let session_audit_path = audit.path().to_path_buf();
        drop(audit);
        artifacts.push(persist_encrypted_copy(
            SESSION_AUDIT_FILE,
            &session_audit_path,
            &encrypted_dir,
            enc_key,
            &self.process_audit,
        ));

        let manifest_path = standard_dir.join(MANIFEST_FILE);
        let manifest = manifest::assemble(ManifestInputs {
            session_id: &id,
            started_at,
            stopped_at,
            consent,
            encryption_enabled: enc_key.is_some(),
            artifacts: &artifacts,
            voice_prints: &voice_prints,
            store: &store,
            ai_training_consent,
            config: &self.config,
            manifest_standard_path: manifest_path,
        });

        // Manifest trouble is isolated like any other artifact failure;
        // nothing past the state guard may abort the reset to Idle.
        let manifest_result = match serde_json::to_vec_pretty(&manifest) {
            Ok(bytes) => persist_artifact(
                MANIFEST_FILE,
                &bytes,
                &standard_dir,
                &encrypted_dir,
                enc_key,
                &self.process_audit,
            ),
            Err(e) => {
                error!("manifest serialization failed: {e}");
                self.process_audit.log_action(
                    AuditKind::FileSaveFailed,
                    json!({ "filename": MANIFEST_FILE, "error": e.to_string() }),
                );
                PersistResult {
                    name: MANIFEST_FILE.to_string(),
                    standard: ArtifactStatus::IoFailure(e.to_string()),
                    encrypted: ArtifactStatus::Skipped(SkipReason::StandardWriteFailed),
                }
            }
        };
        self.process_audit.log_action(
            AuditKind::ManifestWritten,
            json!({
                "session_id": id,
                "standard_ok": manifest_result.standard_ok(),
                "encrypted_ok": manifest_result.encrypted_ok(),
            }),
        );

        // All session-scoped state is discarded here; the session key is
        // zeroized on drop.
        self.state = SessionState::Idle;
        Ok(manifest)
    }
}

/// Consent expires one calendar year after it was given; Feb 29 clamps to
/// day 28 of the following year.
fn consent_expiry(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .with_year(timestamp.year() + 1)
        .or_else(|| {
            timestamp
                .with_day(28)
                .and_then(|d| d.with_year(timestamp.year() + 1))
        })
        .unwrap_or(timestamp)
}

/// Time-based, collision-resistant session identifier.
fn new_session_id() -> String {
    format!(
        "session_{}_{:08x}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        rand::random::<u32>()
    )
}

fn sanitize_file_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn render_transcript(segments: &[TranscriptSegment]) -> String {
    let mut out = String::new();
    for s in segments {
        out.push_str(&format!(
            "[{:8.2}s - {:8.2}s] {}: {}\n",
            s.start_secs, s.end_secs, s.speaker, s.text
        ));
    }
    out
}

fn embedding_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn consent_expiry_is_one_year_out() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 15, 10, 30, 0).unwrap();
        let expiry = consent_expiry(ts);
        assert_eq!(expiry, Utc.with_ymd_and_hms(2026, 3, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn consent_expiry_clamps_leap_day() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
        let expiry = consent_expiry(ts);
        assert_eq!(expiry, Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap());
    }

    #[test]
    fn session_ids_are_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
        assert!(a.starts_with("session_"));
    }

    #[test]
    fn speaker_labels_are_path_safe() {
        assert_eq!(sanitize_file_stem("SPEAKER_00"), "SPEAKER_00");
        assert_eq!(sanitize_file_stem("spk/.. evil"), "spk____evil");
    }

    #[test]
    fn embedding_bytes_round_trip() {
        let embedding = vec![0.5f32, -1.25, 3.0];
        let bytes = embedding_bytes(&embedding);
        assert_eq!(bytes.len(), 12);
        let back: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(back, embedding);
    }
}
