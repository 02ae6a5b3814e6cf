//! Eden Recorder command-line host.
//!
//! Wires the demo collaborators around [`eden_core::SessionManager`],
//! drives the poll loop for a fixed duration and prints a summary of the
//! produced session. Tracing output goes to the application log file from
//! the configuration; stdout is reserved for the user-facing prompts and
//! the final report.

mod collaborators;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde_json::json;
use tracing::{info, warn};

use eden_core::{
    derive_master_key, AuditKind, AuditLog, Collaborators, EdenConfig, EdenError, SessionManager,
    FIXED_SALT, POLL_INTERVAL,
};

use collaborators::{
    DemoDiarization, DemoEmotion, DemoTranscription, RegexRedactor, SineAudioSource,
    TerminalConsent,
};

const TONE_FREQUENCY_HZ: f32 = 440.0;

#[derive(Debug)]
struct Args {
    config: PathBuf,
    password: Option<String>,
    forced_consent: Option<bool>,
    duration: Duration,
}

fn parse_args() -> Result<Args, String> {
    let mut config = PathBuf::from("eden_config.json");
    let mut password: Option<String> = None;
    let mut forced_consent: Option<bool> = None;
    let mut duration_secs: u64 = 10;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --config".into());
                };
                config = PathBuf::from(v);
            }
            "--password" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --password".into());
                };
                password = Some(v);
            }
            "--assume-consent" => forced_consent = Some(true),
            "--deny-consent" => forced_consent = Some(false),
            "--duration-secs" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --duration-secs".into());
                };
                duration_secs = v
                    .parse::<u64>()
                    .map_err(|_| "invalid value for --duration-secs".to_string())?
                    .clamp(1, 600);
            }
            "--help" | "-h" => {
                println!(
                    "Usage: eden [--config <file.json>] [--password <pw>] \\
  [--assume-consent | --deny-consent] [--duration-secs <n>]

The master password may also be supplied via EDEN_PASSWORD; without one
the recorder runs in plaintext-only mode."
                );
                std::process::exit(0);
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    Ok(Args {
        config,
        password,
        forced_consent,
        duration: Duration::from_secs(duration_secs),
    })
}

fn main() {
    if let Err(e) = run() {
        eprintln!("eden: {e:#}");
        std::process::exit(1);
    }
}

/// Open the process-wide audit log, degrading to a disabled sink when the
/// location is unavailable. Auditing is best-effort end to end and never
/// blocks recording.
fn open_process_audit(config: &EdenConfig) -> AuditLog {
    let path = config.process_audit_log_path();
    AuditLog::open(&path).unwrap_or_else(|e| {
        warn!(
            "process audit log unavailable at {}: {e}; continuing without audit",
            path.display()
        );
        AuditLog::disabled(&path)
    })
}

fn run() -> anyhow::Result<()> {
    let args = parse_args().map_err(|e| anyhow::anyhow!(e))?;
    let config = EdenConfig::load_or_create(&args.config);

    if let Some(parent) = config.app_log_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {parent:?}"))?;
        }
    }
    let log_file = std::fs::File::options()
        .create(true)
        .append(true)
        .open(&config.app_log_file)
        .with_context(|| format!("opening application log {:?}", config.app_log_file))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("eden=info,eden_core=info")),
        )
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .init();

    let password = args
        .password
        .or_else(|| std::env::var("EDEN_PASSWORD").ok())
        .unwrap_or_default();
    let master_key = derive_master_key(&password, FIXED_SALT);
    if master_key.is_none() {
        println!("No master password provided; artifacts will be stored in plaintext only.");
    }

    let process_audit = Arc::new(open_process_audit(&config));
    process_audit.log_action(
        AuditKind::AppStart,
        json!({ "version": env!("CARGO_PKG_VERSION") }),
    );

    let collab = Collaborators {
        consent: Box::new(TerminalConsent::new(args.forced_consent)),
        audio: Box::new(SineAudioSource::new(TONE_FREQUENCY_HZ)),
        transcription: Box::new(DemoTranscription::default()),
        diarization: Box::new(DemoDiarization::default()),
        emotion: Box::new(DemoEmotion::default()),
        redactor: Box::new(RegexRedactor::new()?),
    };

    let mut manager = SessionManager::new(config, master_key, collab, Arc::clone(&process_audit));

    if let Err(e) = manager.start_recording() {
        if matches!(e, EdenError::ConsentDenied) {
            println!("Recording consent was denied; no session was created.");
            process_audit.log_action(AuditKind::AppShutdown, json!({ "recorded": false }));
            return Ok(());
        }
        return Err(e.into());
    }

    println!(
        "Recording session {} for {}s...",
        manager.active_session_id().unwrap_or("?"),
        args.duration.as_secs()
    );

    let levels = manager.level_receiver();
    let deadline = Instant::now() + args.duration;
    let mut peak_level = 0.0f32;
    while Instant::now() < deadline {
        manager.tick();
        if let Some(rx) = &levels {
            while let Ok(level) = rx.try_recv() {
                peak_level = peak_level.max(level);
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let manifest = manager.stop_recording()?;

    println!("Session {} complete.", manifest.session_id);
    println!(
        "  encryption:  {}",
        if manifest.encryption.enabled {
            "enabled"
        } else {
            "plaintext only"
        }
    );
    println!("  artifacts:   {}", manifest.artifacts.len());
    println!("  speakers:    {}", manifest.voice_prints.len());
    println!("  peak level:  {peak_level:.3}");
    for detail in &manifest.phi_details {
        println!(
            "  redacted:    {} at bytes {}..{}",
            detail.entity_type, detail.start, detail.end
        );
    }

    process_audit.log_action(AuditKind::AppShutdown, json!({ "recorded": true }));
    info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_audit_opens_at_the_configured_location() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EdenConfig {
            sessions_output_dir: dir.path().join("sessions"),
            app_log_file: dir.path().join("logs/app.log"),
            audit_log_dir: dir.path().join("logs"),
        };

        let audit = open_process_audit(&config);
        audit.log_action(AuditKind::AppStart, json!({}));
        assert!(config.process_audit_log_path().exists());
    }

    #[test]
    fn unavailable_audit_location_degrades_to_a_disabled_sink() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A regular file where the audit directory should be blocks open().
        std::fs::write(dir.path().join("logs"), b"not a directory").unwrap();
        let config = EdenConfig {
            sessions_output_dir: dir.path().join("sessions"),
            app_log_file: dir.path().join("app.log"),
            audit_log_dir: dir.path().join("logs"),
        };

        let audit = open_process_audit(&config);
        audit.log_action(AuditKind::AppStart, json!({}));
        assert!(!config.process_audit_log_path().exists());
    }
}
