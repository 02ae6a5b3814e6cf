//! Timestamped units flowing from producers into the session record.
//!
//! Producers only ever publish these into their queues; the session-scoped
//! sequences they end up in are mutated exclusively by the
//! [`ResultAggregator`](crate::aggregate::ResultAggregator) on the
//! controller thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recognised speech segment as published by the transcription producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    /// Wall-clock time the segment was produced.
    pub captured_at: DateTime<Utc>,
    /// Segment start, seconds from session start.
    pub start_secs: f64,
    /// Segment end, seconds from session start.
    pub end_secs: f64,
    /// Speaker label current at production time (e.g. `SPEAKER_00`).
    pub speaker: String,
    pub text: String,
}

/// A speaker turn from the diarization producer.
///
/// The diarizer emits the voice embedding for the turn alongside the label;
/// the aggregator splits the embedding off into the per-speaker voice-print
/// map and keeps the turn itself in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiarizationLabel {
    pub captured_at: DateTime<Utc>,
    pub speaker: String,
    pub start_secs: f64,
    pub end_secs: f64,
    /// Speaker voice embedding, when the model produced one for this turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// An emotion prediction from the emotion-inference producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionAnnotation {
    pub captured_at: DateTime<Utc>,
    pub emotion: String,
    /// Model confidence in [0.0, 1.0].
    pub confidence: f32,
}

/// One PHI/PII entity detected by the redaction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhiPiiDetail {
    /// The matched source text.
    pub text: String,
    /// Detector entity type (e.g. `PERSON`, `PHONE_NUMBER`).
    pub entity_type: String,
    /// Byte offsets into the raw segment text.
    pub start: usize,
    pub end: usize,
    /// Detector confidence in [0.0, 1.0].
    pub score: f32,
}

/// A span of session audio flagged for muting because the transcript
/// covering it contained sensitive content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    /// Entity types that triggered the mute, comma-separated.
    pub reason: String,
}

/// Outcome of the consent procedure.
#[derive(Debug, Clone)]
pub struct ConsentDecision {
    pub granted: bool,
    /// When consent was given; absent if the dialog was cancelled.
    pub timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diarization_label_omits_absent_embedding() {
        let label = DiarizationLabel {
            captured_at: Utc::now(),
            speaker: "SPEAKER_00".into(),
            start_secs: 0.0,
            end_secs: 1.5,
            embedding: None,
        };
        let json = serde_json::to_value(&label).expect("serialize");
        assert!(json.get("embedding").is_none());
        assert_eq!(json["speaker"], "SPEAKER_00");
    }

    #[test]
    fn phi_detail_serializes_camel_case() {
        let detail = PhiPiiDetail {
            text: "John Doe".into(),
            entity_type: "PERSON".into(),
            start: 11,
            end: 19,
            score: 0.85,
        };
        let json = serde_json::to_value(&detail).expect("serialize");
        assert_eq!(json["entityType"], "PERSON");
        assert_eq!(json["start"], 11);
    }
}
