//! Application configuration (JSON file, rewritten with defaults merged in).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Recognized configuration surface.
///
/// Unknown keys in the file are ignored; missing keys fall back to defaults
/// and the file is rewritten so the on-disk copy always shows the full,
/// effective configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EdenConfig {
    /// Root directory under which per-session folders are created.
    pub sessions_output_dir: PathBuf,
    /// Process log file (tracing output).
    pub app_log_file: PathBuf,
    /// Directory holding the process-wide audit log.
    pub audit_log_dir: PathBuf,
}

impl Default for EdenConfig {
    fn default() -> Self {
        Self {
            sessions_output_dir: PathBuf::from("sessions_output"),
            app_log_file: PathBuf::from("logs/app.log"),
            audit_log_dir: PathBuf::from("logs"),
        }
    }
}

impl EdenConfig {
    /// Load the configuration from `path`, falling back to defaults on a
    /// missing or corrupt file, then rewrite the merged result.
    ///
    /// A config location that cannot be written degrades to in-memory
    /// defaults with a warning; configuration trouble never aborts startup.
    pub fn load_or_create(path: &Path) -> Self {
        let config = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Self>(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!("config {path:?} is corrupt ({e}); rewriting with defaults");
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!("config {path:?} unreadable ({e}); using defaults");
                Self::default()
            }
        };

        if let Err(e) = config.write_to(path) {
            warn!("could not persist config to {path:?}: {e}");
        }
        config
    }

    fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let pretty = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, pretty)
    }

    /// Path of the process-wide audit log inside `audit_log_dir`.
    pub fn process_audit_log_path(&self) -> PathBuf {
        self.audit_log_dir.join("audit_log.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults_and_writes_them() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");

        let config = EdenConfig::load_or_create(&path);
        assert_eq!(config.sessions_output_dir, PathBuf::from("sessions_output"));
        assert!(path.exists(), "defaults should have been written");

        let written: EdenConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.audit_log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults_and_is_rewritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not valid json").unwrap();

        let config = EdenConfig::load_or_create(&path);
        assert_eq!(config.app_log_file, PathBuf::from("logs/app.log"));

        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<EdenConfig>(&rewritten).is_ok());
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "sessionsOutputDir": "/data/sessions" }"#).unwrap();

        let config = EdenConfig::load_or_create(&path);
        assert_eq!(config.sessions_output_dir, PathBuf::from("/data/sessions"));
        assert_eq!(config.app_log_file, PathBuf::from("logs/app.log"));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "auditLogDir": "trail", "legacyOption": 3 }"#).unwrap();

        let config = EdenConfig::load_or_create(&path);
        assert_eq!(config.audit_log_dir, PathBuf::from("trail"));
    }
}
