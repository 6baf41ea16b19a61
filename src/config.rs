//! Configuration management for BeamTouch

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Projected display resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: usize,
    pub height: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

/// Camera resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub width: usize,
    pub height: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Calibration tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Binary threshold applied to the white/black reference difference
    #[serde(default = "default_diff_threshold")]
    pub diff_threshold: u8,

    /// Number of random border-candidate draws
    #[serde(default = "default_samples")]
    pub samples: usize,

    /// Minimum normalized dot product for the collinearity filter
    #[serde(default = "default_collinearity")]
    pub collinearity: f64,

    /// Settle delay between filling the display and capturing a reference
    /// frame, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_diff_threshold() -> u8 {
    80
}

fn default_samples() -> usize {
    500
}

fn default_collinearity() -> f64 {
    0.95
}

fn default_settle_ms() -> u64 {
    200
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            diff_threshold: default_diff_threshold(),
            samples: default_samples(),
            collinearity: default_collinearity(),
            settle_ms: default_settle_ms(),
        }
    }
}

/// Touch-debounce tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TouchConfig {
    /// Consecutive claimed frames an element must exceed before a
    /// sustained touch activates it
    #[serde(default = "default_hold_frames")]
    pub hold_frames: u32,
}

fn default_hold_frames() -> u32 {
    5
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            hold_frames: default_hold_frames(),
        }
    }
}

/// Debug output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Directory for calibration snapshot PNGs; disabled when unset
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub touch: TouchConfig,

    #[serde(default)]
    pub debug: DebugConfig,
}

impl Config {
    /// Load configuration from a file, or create default if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!("Created default configuration at {:?}", path);
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory {:?}", parent))?;
            }
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
