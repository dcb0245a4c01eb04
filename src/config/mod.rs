//! Application Configuration
//!
//! User settings stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::ScanMode;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Session timing settings
    pub session: SessionConfig,
    /// Frame source settings
    pub capture: CaptureSettings,
    /// Fuzzy matching tolerances
    pub matching: MatchingConfig,
    /// File locations
    pub storage: StorageSettings,
}

/// Timing of the scan session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Gap allowed after a batch that matched something
    pub strong_gap_ms: u64,
    /// Gap allowed after a batch that matched nothing
    pub weak_gap_ms: u64,
    /// How long the completion banner holds a clean session
    pub clean_banner_ms: u64,
    /// Mode selected at startup
    pub default_mode: ScanMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            strong_gap_ms: 1200,
            weak_gap_ms: 500,
            clean_banner_ms: 2000,
            default_mode: ScanMode::Food,
        }
    }
}

impl SessionConfig {
    pub fn strong_gap(&self) -> Duration {
        Duration::from_millis(self.strong_gap_ms)
    }

    pub fn weak_gap(&self) -> Duration {
        Duration::from_millis(self.weak_gap_ms)
    }

    pub fn clean_banner(&self) -> Duration {
        Duration::from_millis(self.clean_banner_ms)
    }
}

/// Frame source settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Forward one of every `frame_stride` captured frames
    pub frame_stride: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self { frame_stride: 5 }
    }
}

/// Length-dependent tolerances used by the fuzzy matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Names shorter than this only match as whole words
    pub short_name_len: usize,
    /// Names at least this long get `long_name_tolerance`
    pub long_name_len: usize,
    pub long_name_tolerance: usize,
    pub medium_name_tolerance: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            short_name_len: 4,
            long_name_len: 8,
            long_name_tolerance: 2,
            medium_name_tolerance: 1,
        }
    }
}

/// File locations; `None` means the platform default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub history_db: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
