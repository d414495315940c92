//! MSU (`Storage`) config: process-wide recorder defaults plus the
//! `figure` passthrough section (§2, §6, grounded on
//! `original_source/cvds-msu/config/storage.go` and `figure.go`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::common::{Http, Localize, Log, ServiceConfig, default_version};
use crate::Finalize;

/// External segmenter binary and restart/shutdown timing (§4.7 "1.").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ffmpeg {
    pub bin: String,
    pub exit_restart_interval_secs: u64,
    pub interrupt_timeout_secs: u64,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self {
            bin: "ffmpeg".to_string(),
            exit_restart_interval_secs: 1,
            interrupt_timeout_secs: 1,
        }
    }
}

/// Process-wide storage defaults, applied to every channel started on
/// this MSU instance unless the `/channel/start` request overrides a
/// per-channel field (§4.7, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub data_dir: PathBuf,
    pub ffmpeg: Ffmpeg,
    pub file_name: String,
    /// Segment duration in seconds; floored to 10 per §4.7.
    pub file_duration_secs: u64,
    pub file_format: String,
    pub time_layout: String,
    pub move_interval_secs: u64,
    pub check_delete_interval_secs: u64,
    /// Default retention window in minutes, used when a `/channel/start`
    /// request omits `cover` (§6, GLOSSARY "Cover").
    pub default_cover_minutes: u64,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            ffmpeg: Ffmpeg::default(),
            file_name: "{{channel}}.{{suffix}}".to_string(),
            file_duration_secs: 600,
            file_format: "mp4".to_string(),
            time_layout: "%Y-%m-%d_%Hh%Mm%Ss".to_string(),
            move_interval_secs: 2,
            check_delete_interval_secs: 2,
            default_cover_minutes: 24 * 60,
        }
    }
}

impl Storage {
    pub fn to_recorder_defaults(&self) -> recorder::StorageDefaults {
        recorder::StorageDefaults {
            data_dir: self.data_dir.clone(),
            ffmpeg: recorder::FfmpegConfig {
                bin: self.ffmpeg.bin.clone(),
                exit_restart_interval: Duration::from_secs(self.ffmpeg.exit_restart_interval_secs),
                interrupt_timeout: Duration::from_secs(self.ffmpeg.interrupt_timeout_secs),
            },
            file_name: self.file_name.clone(),
            file_duration: self.file_duration_secs,
            file_format: self.file_format.clone(),
            time_layout: self.time_layout.clone(),
            move_interval: Duration::from_secs(self.move_interval_secs),
            check_delete_interval: Duration::from_secs(self.check_delete_interval_secs),
        }
    }
}

impl Finalize for Storage {
    fn finalize(&mut self) -> Result<()> {
        if self.file_duration_secs < 10 {
            self.file_duration_secs = 10;
        }
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("storage.data_dir must not be empty");
        }
        Ok(())
    }
}

/// Opaque passthrough for the "figure" section (§6) -- a per-deployment
/// grab-bag of display/telemetry fields the original's `figure.go`
/// defines and nothing downstream of config parsing interprets.
pub type Figure = serde_json::Value;

/// Top-level MSU config file (§6): `http`, `storage`, `log`, `service`,
/// `figure`, `localize`, `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: Http,
    pub storage: Storage,
    pub log: Log,
    pub service: ServiceConfig,
    pub figure: Figure,
    pub localize: Localize,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: Http::default(),
            storage: Storage::default(),
            log: Log::default(),
            service: ServiceConfig::default(),
            figure: Figure::default(),
            localize: Localize::default(),
            version: default_version(),
        }
    }
}

impl Finalize for Config {
    fn finalize(&mut self) -> Result<()> {
        self.storage.finalize()
    }
}
