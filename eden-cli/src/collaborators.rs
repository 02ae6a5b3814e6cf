//! Demo collaborators for the CLI host: terminal consent prompts, a
//! synthesized tone as the capture device, scripted producers and a
//! regex-based redactor.
//!
//! These stand in for the real dialog/model integrations; the core never
//! sees the difference.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::Sender;
use regex::Regex;
use tracing::{info, warn};

use eden_core::collab::{
    AudioSource, ConsentGate, DiarizationProducer, EmotionProducer, Redactor,
    TranscriptionProducer,
};
use eden_core::error::{EdenError, Result};
use eden_core::types::{
    ConsentDecision, DiarizationLabel, EmotionAnnotation, PhiPiiDetail, TranscriptSegment,
};

// ---------------------------------------------------------------------------
// Consent
// ---------------------------------------------------------------------------

/// Terminal consent gate. `forced` bypasses the prompt (for scripted and
/// headless runs); otherwise the decision is read from stdin.
pub struct TerminalConsent {
    forced: Option<bool>,
}

impl TerminalConsent {
    pub fn new(forced: Option<bool>) -> Self {
        Self { forced }
    }

    fn prompt_yes_no(question: &str) -> bool {
        print!("{question} [y/N] ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

impl ConsentGate for TerminalConsent {
    fn run_consent_procedure(&mut self) -> ConsentDecision {
        let granted = match self.forced {
            Some(v) => v,
            None => Self::prompt_yes_no(
                "This session will record audio and derive transcripts. Proceed?",
            ),
        };
        ConsentDecision {
            granted,
            timestamp: granted.then(Utc::now),
        }
    }

    fn collect_ai_training_consent(&mut self, speakers: &[String]) -> BTreeMap<String, bool> {
        speakers
            .iter()
            .map(|speaker| {
                let granted = match self.forced {
                    Some(v) => v,
                    None => Self::prompt_yes_no(&format!(
                        "May {speaker}'s voice print be used for AI training?"
                    )),
                };
                (speaker.clone(), granted)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

const SAMPLE_RATE: u32 = 16_000;
const CHUNK_SAMPLES: usize = 1_600; // 100 ms at 16 kHz
const TONE_AMPLITUDE: f32 = 0.3;

struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Result<()>>,
}

/// Capture device that records a synthesized sine tone. Writes 16-bit mono
/// PCM in 100 ms chunks and publishes an RMS level per chunk.
pub struct SineAudioSource {
    frequency_hz: f32,
    worker: Option<CaptureWorker>,
}

impl SineAudioSource {
    pub fn new(frequency_hz: f32) -> Self {
        Self {
            frequency_hz,
            worker: None,
        }
    }
}

impl AudioSource for SineAudioSource {
    fn start(&mut self, output_path: &Path, levels: Sender<f32>) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(output_path, spec)
            .map_err(|e| EdenError::AudioSource(e.to_string()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let step = std::f32::consts::TAU * self.frequency_hz / SAMPLE_RATE as f32;

        let handle = std::thread::spawn(move || -> Result<()> {
            let mut phase = 0.0f32;
            while !stop_flag.load(Ordering::Relaxed) {
                let mut sum_sq = 0.0f32;
                for _ in 0..CHUNK_SAMPLES {
                    let sample = phase.sin() * TONE_AMPLITUDE;
                    phase += step;
                    if phase > std::f32::consts::TAU {
                        phase -= std::f32::consts::TAU;
                    }
                    sum_sq += sample * sample;
                    writer
                        .write_sample((sample * f32::from(i16::MAX)) as i16)
                        .map_err(|e| EdenError::AudioSource(e.to_string()))?;
                }
                let _ = levels.send((sum_sq / CHUNK_SAMPLES as f32).sqrt());
                std::thread::sleep(Duration::from_millis(100));
            }
            writer
                .finalize()
                .map_err(|e| EdenError::AudioSource(e.to_string()))
        });

        self.worker = Some(CaptureWorker { stop, handle });
        info!("synthesized capture started at {SAMPLE_RATE} Hz");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.stop.store(true, Ordering::Relaxed);
        worker
            .handle
            .join()
            .map_err(|_| EdenError::AudioSource("capture thread panicked".into()))?
    }
}

// ---------------------------------------------------------------------------
// Scripted producers
// ---------------------------------------------------------------------------

struct ProducerWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ProducerWorker {
    fn spawn(f: impl FnOnce(&AtomicBool) + Send + 'static) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || f(&stop_flag));
        Self { stop, handle }
    }

    fn stop_and_join(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.handle.join().is_err() {
            warn!("producer thread panicked during shutdown");
        }
    }
}

const DEMO_LINES: &[(&str, &str)] = &[
    ("SPEAKER_00", "Good morning, thanks for joining the session."),
    (
        "SPEAKER_01",
        "Morning. You can reach me at jane.doe@example.com afterwards.",
    ),
    (
        "SPEAKER_00",
        "Noted. My direct line is 555-0142 if anything urgent comes up.",
    ),
    ("SPEAKER_01", "Great, let's get started with the review."),
];

const LINE_INTERVAL: Duration = Duration::from_millis(700);
const LINE_SECS: f64 = 3.0;

/// Transcription producer replaying a fixed demo conversation.
#[derive(Default)]
pub struct DemoTranscription {
    worker: Option<ProducerWorker>,
}

impl TranscriptionProducer for DemoTranscription {
    fn start(&mut self, _session_id: &str, results: Sender<TranscriptSegment>) -> Result<()> {
        self.worker = Some(ProducerWorker::spawn(move |stop| {
            for (i, (speaker, text)) in DEMO_LINES.iter().enumerate() {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                let segment = TranscriptSegment {
                    captured_at: Utc::now(),
                    start_secs: i as f64 * LINE_SECS,
                    end_secs: (i + 1) as f64 * LINE_SECS,
                    speaker: (*speaker).to_string(),
                    text: (*text).to_string(),
                };
                if results.send(segment).is_err() {
                    return;
                }
                std::thread::sleep(LINE_INTERVAL);
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop_and_join();
        }
    }
}

/// Diarization producer emitting one turn per demo line, with a small
/// random embedding as the speaker's voice print.
#[derive(Default)]
pub struct DemoDiarization {
    worker: Option<ProducerWorker>,
}

impl DiarizationProducer for DemoDiarization {
    fn start(&mut self, _session_id: &str, results: Sender<DiarizationLabel>) -> Result<()> {
        self.worker = Some(ProducerWorker::spawn(move |stop| {
            for (i, (speaker, _)) in DEMO_LINES.iter().enumerate() {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                let embedding: Vec<f32> = (0..8).map(|_| rand::random::<f32>()).collect();
                let label = DiarizationLabel {
                    captured_at: Utc::now(),
                    speaker: (*speaker).to_string(),
                    start_secs: i as f64 * LINE_SECS,
                    end_secs: (i + 1) as f64 * LINE_SECS,
                    embedding: Some(embedding),
                };
                if results.send(label).is_err() {
                    return;
                }
                std::thread::sleep(LINE_INTERVAL);
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop_and_join();
        }
    }
}

/// Emotion producer cycling through a fixed palette.
#[derive(Default)]
pub struct DemoEmotion {
    worker: Option<ProducerWorker>,
}

impl EmotionProducer for DemoEmotion {
    fn start(&mut self, _session_id: &str, results: Sender<EmotionAnnotation>) -> Result<()> {
        self.worker = Some(ProducerWorker::spawn(move |stop| {
            let palette = ["neutral", "engaged", "calm"];
            let mut i = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let annotation = EmotionAnnotation {
                    captured_at: Utc::now(),
                    emotion: palette[i % palette.len()].to_string(),
                    confidence: 0.6 + 0.1 * (i % 3) as f32,
                };
                if results.send(annotation).is_err() {
                    return;
                }
                i += 1;
                std::thread::sleep(Duration::from_millis(600));
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop_and_join();
        }
    }
}

// ---------------------------------------------------------------------------
// Redaction
// ---------------------------------------------------------------------------

/// Pattern-based PHI/PII redactor covering email addresses and phone
/// numbers. Matched text is replaced with `<ENTITY_TYPE>`.
pub struct RegexRedactor {
    rules: Vec<(&'static str, Regex)>,
}

impl RegexRedactor {
    pub fn new() -> anyhow::Result<Self> {
        let rules = vec![
            (
                "EMAIL_ADDRESS",
                Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")?,
            ),
            (
                "PHONE_NUMBER",
                Regex::new(r"\b(?:\+?\d{1,3}[\s.-])?(?:\(\d{3}\)[\s.-]?|\d{3}[\s.-])?\d{3}[\s.-]\d{4}\b")?,
            ),
        ];
        Ok(Self { rules })
    }
}

impl Redactor for RegexRedactor {
    fn redact(&mut self, text: &str) -> (String, Vec<PhiPiiDetail>) {
        let mut details = Vec::new();
        for (entity_type, regex) in &self.rules {
            for m in regex.find_iter(text) {
                details.push(PhiPiiDetail {
                    text: m.as_str().to_string(),
                    entity_type: (*entity_type).to_string(),
                    start: m.start(),
                    end: m.end(),
                    score: 1.0,
                });
            }
        }

        let mut redacted = text.to_string();
        for (entity_type, regex) in &self.rules {
            redacted = regex
                .replace_all(&redacted, format!("<{entity_type}>"))
                .into_owned();
        }
        (redacted, details)
    }
}
