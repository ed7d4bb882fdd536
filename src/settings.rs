use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::shared::paths::{ensure_dir, get_recordings_dir, get_storage_dir};

/// Recorder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderSettings {
    pub frame_rate: u32,
    /// Longest side of encoded frames; the other side keeps the source aspect ratio.
    pub max_dimension: u32,
    /// Compression quality, 0-100.
    pub quality: u8,
    /// Frames kept by rolling sessions.
    pub ring_capacity: usize,
    /// Trigger binding, interpreted by the host.
    pub capture_key: String,
    pub output_dir: Option<PathBuf>,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            max_dimension: 160,
            quality: 50,
            ring_capacity: 300,
            capture_key: "F11".to_string(),
            output_dir: None,
        }
    }
}

impl RecorderSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.frame_rate == 0 {
            return Err(SettingsError::invalid("frameRate must be at least 1"));
        }
        if self.max_dimension == 0 {
            return Err(SettingsError::invalid("maxDimension must be at least 1"));
        }
        if self.quality > 100 {
            return Err(SettingsError::invalid(format!(
                "quality must be 0-100, got {}",
                self.quality
            )));
        }
        if self.ring_capacity == 0 {
            return Err(SettingsError::invalid("ringCapacity must be at least 1"));
        }
        Ok(())
    }

    /// Directory new recordings are written to.
    pub fn recordings_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(get_recordings_dir)
    }
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse settings: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid settings: {0}")]
    Invalid(String),
}

impl SettingsError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SettingsError::Invalid(msg.into())
    }
}

fn get_settings_path() -> PathBuf {
    get_storage_dir().join("settings.json")
}

/// Load settings from disk, returning defaults if the file is missing or invalid
pub fn load_settings() -> RecorderSettings {
    let path = get_settings_path();

    if !path.exists() {
        tracing::info!(target: "system", "Settings file not found, using defaults");
        return RecorderSettings::default();
    }

    match load_settings_from_file(&path) {
        Ok(settings) => {
            tracing::info!(target: "system", "Settings loaded from {:?}", path);
            settings
        }
        Err(e) => {
            tracing::warn!(target: "system", "Failed to load settings: {}, using defaults", e);
            RecorderSettings::default()
        }
    }
}

pub fn load_settings_from_file(path: &Path) -> Result<RecorderSettings, SettingsError> {
    let contents = std::fs::read_to_string(path)?;
    let settings: RecorderSettings = serde_json::from_str(&contents)?;
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings_to_file(path: &Path, settings: &RecorderSettings) -> Result<(), SettingsError> {
    settings.validate()?;

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let contents = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, contents)?;

    tracing::info!(target: "system", "Settings saved to {:?}", path);
    Ok(())
}
