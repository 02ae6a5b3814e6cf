//! Result aggregator: cooperative, fixed-interval draining of producer
//! queues into the session-scoped record.
//!
//! ## Threading
//!
//! Producers push into unbounded crossbeam channels from their own threads.
//! All draining and all mutation of [`SessionStore`] happen on the single
//! controller thread that calls [`ResultAggregator::tick`], which is what
//! makes the store lock-free: the channels are the only cross-thread
//! synchronization. The thread suspends only between ticks — there is no
//! blocking wait on any queue.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use serde_json::json;

use crate::audit::{AuditKind, AuditLog};
use crate::collab::Redactor;
use crate::types::{
    DiarizationLabel, EmotionAnnotation, MuteSegment, PhiPiiDetail, TranscriptSegment,
};

/// Poll interval for diarization labels.
pub const DIARIZATION_POLL: Duration = Duration::from_millis(200);

/// Poll interval for transcript segments. Redaction runs on this tick.
pub const TRANSCRIPT_POLL: Duration = Duration::from_millis(150);

/// Poll interval for emotion annotations. Emotion predictions arrive far
/// less often than transcript output, so a slower cadence suffices.
pub const EMOTION_POLL: Duration = Duration::from_millis(500);

/// All session-scoped collections the aggregator feeds.
///
/// Mutated only on the controller thread; read once, after the final drain,
/// when artifacts are persisted.
#[derive(Debug, Default)]
pub struct SessionStore {
    /// Raw transcript segments, in arrival order.
    pub transcript: Vec<TranscriptSegment>,
    /// Redacted counterparts, same order and length as `transcript`.
    pub redacted_transcript: Vec<TranscriptSegment>,
    /// Speaker turns, in arrival order.
    pub diarization: Vec<DiarizationLabel>,
    /// Emotion annotations, in arrival order.
    pub emotions: Vec<EmotionAnnotation>,
    /// Every PHI/PII entity detected across all segments.
    pub phi_details: Vec<PhiPiiDetail>,
    /// Audio spans flagged for muting.
    pub mute_segments: Vec<MuteSegment>,
    /// Latest voice embedding per speaker.
    pub voice_prints: BTreeMap<String, Vec<f32>>,
}

impl SessionStore {
    /// Distinct speaker labels seen in this session, sorted.
    pub fn speakers(&self) -> Vec<String> {
        let mut speakers: Vec<String> = self
            .diarization
            .iter()
            .map(|l| l.speaker.clone())
            .chain(self.voice_prints.keys().cloned())
            .collect();
        speakers.sort();
        speakers.dedup();
        speakers
    }
}

/// A fixed-interval cooperative timer. Fires on the first check after
/// construction, then at most once per interval.
struct PollTimer {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl PollTimer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    fn due(&mut self, now: Instant) -> bool {
        let due = match self.last_fired {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if due {
            self.last_fired = Some(now);
        }
        due
    }
}

/// Drains the three producer queues on their poll timers.
pub struct ResultAggregator {
    diarization_rx: Receiver<DiarizationLabel>,
    transcript_rx: Receiver<TranscriptSegment>,
    emotion_rx: Receiver<EmotionAnnotation>,
    diarization_timer: PollTimer,
    transcript_timer: PollTimer,
    emotion_timer: PollTimer,
}

impl ResultAggregator {
    pub fn new(
        diarization_rx: Receiver<DiarizationLabel>,
        transcript_rx: Receiver<TranscriptSegment>,
        emotion_rx: Receiver<EmotionAnnotation>,
    ) -> Self {
        Self {
            diarization_rx,
            transcript_rx,
            emotion_rx,
            diarization_timer: PollTimer::new(DIARIZATION_POLL),
            transcript_timer: PollTimer::new(TRANSCRIPT_POLL),
            emotion_timer: PollTimer::new(EMOTION_POLL),
        }
    }

    /// One cooperative poll cycle: drain every queue whose timer is due.
    pub fn tick(&mut self, store: &mut SessionStore, redactor: &mut dyn Redactor, audit: &AuditLog) {
        let now = Instant::now();

        if self.diarization_timer.due(now) {
            self.drain_diarization(store);
        }
        if self.transcript_timer.due(now) {
            self.drain_transcript(store, redactor, audit);
        }
        if self.emotion_timer.due(now) {
            self.drain_emotions(store);
        }
    }

    /// Final drain after a stop request, ignoring timers. Producers are
    /// stopped best-effort, so a last partial batch may still be sitting in
    /// the queues; this absorbs it before artifacts are read.
    pub fn drain_all(
        &mut self,
        store: &mut SessionStore,
        redactor: &mut dyn Redactor,
        audit: &AuditLog,
    ) {
        self.drain_diarization(store);
        self.drain_transcript(store, redactor, audit);
        self.drain_emotions(store);
    }

    fn drain_diarization(&mut self, store: &mut SessionStore) {
        while let Ok(label) = self.diarization_rx.try_recv() {
            if let Some(embedding) = &label.embedding {
                store
                    .voice_prints
                    .insert(label.speaker.clone(), embedding.clone());
            }
            store.diarization.push(label);
        }
    }

    fn drain_transcript(
        &mut self,
        store: &mut SessionStore,
        redactor: &mut dyn Redactor,
        audit: &AuditLog,
    ) {
        while let Ok(segment) = self.transcript_rx.try_recv() {
            let (redacted_text, entities) = redactor.redact(&segment.text);

            if !entities.is_empty() {
                let entity_types: Vec<&str> =
                    entities.iter().map(|e| e.entity_type.as_str()).collect();
                audit.log_action(
                    AuditKind::PiiDetected,
                    json!({
                        "count": entities.len(),
                        "entity_types": entity_types,
                        "start_secs": segment.start_secs,
                        "end_secs": segment.end_secs,
                    }),
                );
                store.mute_segments.push(MuteSegment {
                    start_secs: segment.start_secs,
                    end_secs: segment.end_secs,
                    reason: entity_types.join(","),
                });
                store.phi_details.extend(entities);
            }

            // Raw and redacted forms are both retained, never only one.
            let mut redacted = segment.clone();
            redacted.text = redacted_text;
            store.transcript.push(segment);
            store.redacted_transcript.push(redacted);
        }
    }

    fn drain_emotions(&mut self, store: &mut SessionStore) {
        while let Ok(annotation) = self.emotion_rx.try_recv() {
            store.emotions.push(annotation);
        }
    }
}
