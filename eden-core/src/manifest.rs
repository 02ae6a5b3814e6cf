//! Metadata assembler: builds the final session manifest.
//!
//! The manifest is assembled after every other artifact has been attempted,
//! so each artifact entry can reflect what actually landed on disk: the
//! standard path appears iff the standard write succeeded, the encrypted
//! path iff that specific encryption attempt succeeded. The manifest is
//! then persisted exactly like any other artifact; its own entry lists only
//! the standard path (non-recursive by design — the encrypted sibling's
//! fate cannot be known before the manifest content is fixed).

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::SessionStore;
use crate::config::EdenConfig;
use crate::persist::PersistResult;
use crate::types::{EmotionAnnotation, MuteSegment, PhiPiiDetail};

/// The session consent record as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRecord {
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Consent expiry: one calendar year after the consent timestamp
    /// (Feb 29 clamps to day 28).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

/// Whether this session's artifacts carry encrypted siblings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionRecord {
    /// True when a session key was wrapped under the master key and used
    /// to seal artifacts.
    pub enabled: bool,
    /// Explicit plaintext-only marker; surfaced rather than silently
    /// degrading when no master key was available.
    pub plaintext_only: bool,
}

/// One artifact's on-disk locations. Paths are present iff the
/// corresponding write succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_path: Option<PathBuf>,
}

impl ArtifactEntry {
    pub fn from_result(result: &PersistResult) -> Self {
        Self {
            name: result.name.clone(),
            standard_path: result.standard.path().map(Into::into),
            encrypted_path: result.encrypted.path().map(Into::into),
        }
    }
}

/// The final structured description of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionManifest {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub consent: ConsentRecord,
    pub encryption: EncryptionRecord,
    pub artifacts: Vec<ArtifactEntry>,
    pub phi_details: Vec<PhiPiiDetail>,
    pub mute_segments: Vec<MuteSegment>,
    pub emotions: Vec<EmotionAnnotation>,
    /// Per-speaker voice-print artifact locations.
    pub voice_prints: BTreeMap<String, ArtifactEntry>,
    /// Per-speaker AI-training consent collected after the stop request.
    pub ai_training_consent: BTreeMap<String, bool>,
    /// Snapshot of the configuration active during the session.
    pub config: EdenConfig,
}

/// Everything the assembler needs, gathered by the lifecycle controller.
pub struct ManifestInputs<'a> {
    pub session_id: &'a str,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub consent: ConsentRecord,
    pub encryption_enabled: bool,
    pub artifacts: &'a [PersistResult],
    pub voice_prints: &'a BTreeMap<String, PersistResult>,
    pub store: &'a SessionStore,
    pub ai_training_consent: BTreeMap<String, bool>,
    pub config: &'a EdenConfig,
    /// Where the manifest itself will be written (standard side).
    pub manifest_standard_path: PathBuf,
}

/// Build the manifest from aggregated state and persistence results.
pub fn assemble(inputs: ManifestInputs<'_>) -> SessionManifest {
    let mut artifacts: Vec<ArtifactEntry> = inputs
        .artifacts
        .iter()
        .map(ArtifactEntry::from_result)
        .collect();
    artifacts.push(ArtifactEntry {
        name: inputs
            .manifest_standard_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session_manifest.json".to_string()),
        standard_path: Some(inputs.manifest_standard_path),
        encrypted_path: None,
    });

    let voice_prints = inputs
        .voice_prints
        .iter()
        .map(|(speaker, result)| (speaker.clone(), ArtifactEntry::from_result(result)))
        .collect();

    SessionManifest {
        session_id: inputs.session_id.to_string(),
        started_at: inputs.started_at,
        stopped_at: inputs.stopped_at,
        consent: inputs.consent,
        encryption: EncryptionRecord {
            enabled: inputs.encryption_enabled,
            plaintext_only: !inputs.encryption_enabled,
        },
        artifacts,
        phi_details: inputs.store.phi_details.clone(),
        mute_segments: inputs.store.mute_segments.clone(),
        emotions: inputs.store.emotions.clone(),
        voice_prints,
        ai_training_consent: inputs.ai_training_consent,
        config: inputs.config.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{ArtifactStatus, SkipReason};

    fn result(name: &str, standard: ArtifactStatus, encrypted: ArtifactStatus) -> PersistResult {
        PersistResult {
            name: name.into(),
            standard,
            encrypted,
        }
    }

    fn base_inputs<'a>(
        artifacts: &'a [PersistResult],
        voice_prints: &'a BTreeMap<String, PersistResult>,
        store: &'a SessionStore,
        config: &'a EdenConfig,
        encryption_enabled: bool,
    ) -> ManifestInputs<'a> {
        ManifestInputs {
            session_id: "session_20250101_000000_deadbeef",
            started_at: Utc::now(),
            stopped_at: Utc::now(),
            consent: ConsentRecord {
                granted: true,
                timestamp: Some(Utc::now()),
                expiry: Some(Utc::now()),
            },
            encryption_enabled,
            artifacts,
            voice_prints,
            store,
            ai_training_consent: BTreeMap::new(),
            config,
            manifest_standard_path: PathBuf::from("/s/standard/session_manifest.json"),
        }
    }

    #[test]
    fn encrypted_path_appears_iff_encryption_succeeded() {
        let artifacts = vec![
            result(
                "a.txt",
                ArtifactStatus::Written("/s/standard/a.txt".into()),
                ArtifactStatus::Written("/s/encrypted/a.txt.enc".into()),
            ),
            result(
                "b.txt",
                ArtifactStatus::Written("/s/standard/b.txt".into()),
                ArtifactStatus::CryptoFailure("boom".into()),
            ),
            result(
                "c.txt",
                ArtifactStatus::IoFailure("disk full".into()),
                ArtifactStatus::Skipped(SkipReason::StandardWriteFailed),
            ),
        ];
        let voice_prints = BTreeMap::new();
        let store = SessionStore::default();
        let config = EdenConfig::default();

        let manifest = assemble(base_inputs(&artifacts, &voice_prints, &store, &config, true));

        let a = &manifest.artifacts[0];
        assert!(a.standard_path.is_some() && a.encrypted_path.is_some());
        let b = &manifest.artifacts[1];
        assert!(b.standard_path.is_some() && b.encrypted_path.is_none());
        let c = &manifest.artifacts[2];
        assert!(c.standard_path.is_none() && c.encrypted_path.is_none());
    }

    #[test]
    fn manifest_lists_itself_with_standard_path_only() {
        let artifacts = Vec::new();
        let voice_prints = BTreeMap::new();
        let store = SessionStore::default();
        let config = EdenConfig::default();

        let manifest = assemble(base_inputs(&artifacts, &voice_prints, &store, &config, false));

        let own = manifest
            .artifacts
            .iter()
            .find(|a| a.name == "session_manifest.json")
            .expect("manifest self-entry");
        assert!(own.standard_path.is_some());
        assert!(own.encrypted_path.is_none());
        assert!(manifest.encryption.plaintext_only);
    }

    #[test]
    fn serializes_camel_case_and_omits_absent_paths() {
        let artifacts = vec![result(
            "t.txt",
            ArtifactStatus::Written("/s/standard/t.txt".into()),
            ArtifactStatus::Skipped(SkipReason::EncryptionUnavailable),
        )];
        let voice_prints = BTreeMap::new();
        let store = SessionStore::default();
        let config = EdenConfig::default();

        let manifest = assemble(base_inputs(&artifacts, &voice_prints, &store, &config, false));
        let json = serde_json::to_value(&manifest).expect("serialize");

        assert!(json["sessionId"].is_string());
        assert_eq!(json["encryption"]["plaintextOnly"], true);
        assert!(json["artifacts"][0].get("encryptedPath").is_none());
        assert!(json["artifacts"][0]["standardPath"].is_string());
    }
}
