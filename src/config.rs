//! Persisted operator settings
//!
//! A small TOML file holding the LLM endpoint and the auto-task intervals.
//! Loading order: the `SOLAROPS_CONFIG` environment variable, then
//! `./solarops.toml`, then built-in defaults. A file that fails validation
//! is rejected whole; no field of it is applied.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_ANALYSIS_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_DOWNLOAD_INTERVAL_SECS: u64 = 600;

pub const ANALYSIS_INTERVAL_RANGE: (u64, u64) = (30, 3600);
pub const DOWNLOAD_INTERVAL_RANGE: (u64, u64) = (60, 7200);

const LOCAL_SETTINGS_FILE: &str = "solarops.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O error ({0}): {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("settings parse error ({0}): {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("settings serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid setting: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible chat endpoint.
    pub llm_base_url: String,
    /// Period of the automatic AI analysis task, in seconds.
    pub ai_analysis_interval_secs: u64,
    /// Period of the automatic log download task, in seconds.
    pub log_download_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            ai_analysis_interval_secs: DEFAULT_ANALYSIS_INTERVAL_SECS,
            log_download_interval_secs: DEFAULT_DOWNLOAD_INTERVAL_SECS,
        }
    }
}

impl Settings {
    /// Load using the standard search order, falling back to defaults.
    /// A present-but-invalid file is logged and skipped, never half-applied.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("SOLAROPS_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(settings) => {
                        info!(path = %p.display(), "Loaded settings from SOLAROPS_CONFIG");
                        return settings;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load settings from SOLAROPS_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "SOLAROPS_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_SETTINGS_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(settings) => {
                    info!("Loaded settings from ./{LOCAL_SETTINGS_FILE}");
                    return settings;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_SETTINGS_FILE}, using defaults");
                }
            }
        }

        info!("Using built-in default settings");
        Self::default()
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::Io(path.to_path_buf(), e))?;
        let settings: Self =
            toml::from_str(&contents).map_err(|e| SettingsError::Parse(path.to_path_buf(), e))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        self.validate()?;
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| SettingsError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.llm_base_url.trim().is_empty() {
            return Err(SettingsError::Validation(
                "llm_base_url must not be empty".into(),
            ));
        }
        if !self.llm_base_url.starts_with("http://") && !self.llm_base_url.starts_with("https://")
        {
            return Err(SettingsError::Validation(format!(
                "llm_base_url must be an http(s) URL, got '{}'",
                self.llm_base_url
            )));
        }
        check_range(
            self.ai_analysis_interval_secs,
            ANALYSIS_INTERVAL_RANGE,
            "ai_analysis_interval_secs",
        )?;
        check_range(
            self.log_download_interval_secs,
            DOWNLOAD_INTERVAL_RANGE,
            "log_download_interval_secs",
        )?;
        Ok(())
    }

    /// Apply a candidate wholesale after validating it. The current value
    /// is untouched when the candidate is invalid.
    pub fn apply(&mut self, candidate: Settings) -> Result<(), SettingsError> {
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }
}

fn check_range(value: u64, (lo, hi): (u64, u64), field: &str) -> Result<(), SettingsError> {
    if value < lo || value > hi {
        return Err(SettingsError::Validation(format!(
            "{field} must be in [{lo}, {hi}] seconds, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn round_trips_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solarops.toml");
        let settings = Settings {
            llm_base_url: "http://10.0.0.5:8080".into(),
            ai_analysis_interval_secs: 45,
            log_download_interval_secs: 900,
        };
        settings.save_to_file(&path).unwrap();
        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "ai_analysis_interval_secs = 60\n").unwrap();
        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded.ai_analysis_interval_secs, 60);
        assert_eq!(loaded.llm_base_url, DEFAULT_LLM_BASE_URL);
        assert_eq!(
            loaded.log_download_interval_secs,
            DEFAULT_DOWNLOAD_INTERVAL_SECS
        );
    }

    #[test]
    fn out_of_range_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "ai_analysis_interval_secs = 5\n").unwrap();
        assert!(matches!(
            Settings::load_from_file(&path),
            Err(SettingsError::Validation(_))
        ));
    }

    #[test]
    fn invalid_candidate_leaves_current_settings_untouched() {
        let mut current = Settings::default();
        let bad = Settings {
            llm_base_url: "ftp://nope".into(),
            ..Settings::default()
        };
        assert!(current.apply(bad).is_err());
        assert_eq!(current, Settings::default());

        let good = Settings {
            ai_analysis_interval_secs: 300,
            ..Settings::default()
        };
        current.apply(good.clone()).unwrap();
        assert_eq!(current, good);
    }

    #[test]
    fn save_refuses_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.toml");
        let bad = Settings {
            log_download_interval_secs: 10,
            ..Settings::default()
        };
        assert!(bad.save_to_file(&path).is_err());
        assert!(!path.exists());
    }
}
