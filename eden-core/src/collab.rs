//! Collaborator interfaces.
//!
//! The core never dictates presentation or inference: consent prompts,
//! audio capture, the speech/diarization/emotion models and the redaction
//! NLP all live behind these traits, implemented by the host (CLI, service,
//! or a future GUI). Producers receive a channel sender at start and push
//! timestamped results into it from their own execution context; they have
//! no other interaction with the core.

use std::collections::BTreeMap;
use std::path::Path;

use crossbeam_channel::Sender;

use crate::error::Result;
use crate::types::{
    ConsentDecision, DiarizationLabel, EmotionAnnotation, PhiPiiDetail, TranscriptSegment,
};

/// Synchronous consent prompts, invoked on the controller thread.
pub trait ConsentGate {
    /// Run the recording-consent procedure (modal from the caller's point
    /// of view) before a session may start.
    fn run_consent_procedure(&mut self) -> ConsentDecision;

    /// Collect per-speaker AI-training consent after the session stops.
    /// Speakers not present in the returned map are treated as non-consenting.
    fn collect_ai_training_consent(&mut self, speakers: &[String]) -> BTreeMap<String, bool>;
}

/// The audio capture device.
///
/// `start` must begin writing the session audio to `output_path`; level
/// samples (RMS in [0.0, 1.0]) go to `levels` for host-side metering.
pub trait AudioSource {
    fn start(&mut self, output_path: &Path, levels: Sender<f32>) -> Result<()>;

    /// Best-effort stop signal; the standard audio file must be complete on
    /// disk when this returns.
    fn stop(&mut self) -> Result<()>;
}

/// Live transcription producer.
pub trait TranscriptionProducer {
    fn start(&mut self, session_id: &str, results: Sender<TranscriptSegment>) -> Result<()>;
    fn stop(&mut self);
}

/// Live diarization producer (speaker turns + voice embeddings).
pub trait DiarizationProducer {
    fn start(&mut self, session_id: &str, results: Sender<DiarizationLabel>) -> Result<()>;
    fn stop(&mut self);
}

/// Live emotion-inference producer.
pub trait EmotionProducer {
    fn start(&mut self, session_id: &str, results: Sender<EmotionAnnotation>) -> Result<()>;
    fn stop(&mut self);
}

/// PHI/PII redaction, invoked synchronously by the aggregator on its poll
/// tick, before the segment is stored.
pub trait Redactor {
    /// Returns the redacted text and the entities that were removed.
    fn redact(&mut self, text: &str) -> (String, Vec<PhiPiiDetail>);
}

/// The full set of injected collaborators a [`SessionManager`] is
/// constructed with.
///
/// [`SessionManager`]: crate::session::SessionManager
pub struct Collaborators {
    pub consent: Box<dyn ConsentGate>,
    pub audio: Box<dyn AudioSource>,
    pub transcription: Box<dyn TranscriptionProducer>,
    pub diarization: Box<dyn DiarizationProducer>,
    pub emotion: Box<dyn EmotionProducer>,
    pub redactor: Box<dyn Redactor>,
}
