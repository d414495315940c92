//! Per-channel and process-wide defaults for the segmenter/mover/deleter
//! trio. Grounded on `original_source/cvds-msu/config/storage.go`'s
//! `Storage` struct; process-wide fields land here (and are supplied by
//! `apps/msu` from its own config section) while per-channel fields
//! (`name`, `url`, `transport`, `cover`, `fields`) are supplied at
//! `ChannelConfig::new` time from the `/channel/start` request body.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ChannelError;

/// External segmenter binary and its restart/shutdown timing (§4.7 "1.
/// Segmenter supervisor").
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub bin: String,
    pub exit_restart_interval: Duration,
    pub interrupt_timeout: Duration,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            bin: "ffmpeg".to_string(),
            exit_restart_interval: Duration::from_secs(1),
            interrupt_timeout: Duration::from_secs(1),
        }
    }
}

/// Process-wide storage defaults, shared by every channel started on
/// this MSU instance.
#[derive(Debug, Clone)]
pub struct StorageDefaults {
    pub data_dir: PathBuf,
    pub ffmpeg: FfmpegConfig,
    /// `{{var}}` template for the part of the filename after the
    /// timestamp prefix (§4.7 "Filename template variables").
    pub file_name: String,
    /// Segment duration in seconds; floored to 10 per §4.7.
    pub file_duration: u64,
    pub file_format: String,
    /// `chrono` strftime format used both to stamp the timestamp prefix
    /// and to parse it back during mover/deleter scans.
    pub time_layout: String,
    pub move_interval: Duration,
    pub check_delete_interval: Duration,
}

impl Default for StorageDefaults {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            ffmpeg: FfmpegConfig::default(),
            file_name: "{{channel}}.{{suffix}}".to_string(),
            file_duration: 10 * 60,
            file_format: "mp4".to_string(),
            time_layout: "%Y-%m-%d_%Hh%Mm%Ss".to_string(),
            move_interval: Duration::from_secs(2),
            check_delete_interval: Duration::from_secs(2),
        }
    }
}

/// Fully resolved configuration for one channel, combining the process
/// defaults with the per-channel parameters given at start time.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub name: String,
    pub url: String,
    pub transport: String,
    /// Retention window in minutes (§4.7 "3. Deleter"; "Cover" in the
    /// GLOSSARY is minutes in the MSU context).
    pub cover_minutes: u64,
    pub fields: HashMap<String, String>,
    pub defaults: StorageDefaults,
}

impl ChannelConfig {
    pub fn new(
        name: String,
        url: String,
        transport: String,
        cover_minutes: u64,
        fields: HashMap<String, String>,
        defaults: StorageDefaults,
    ) -> Result<Self, ChannelError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(ChannelError::InvalidName(name));
        }
        if url.is_empty() {
            return Err(ChannelError::InvalidUrl(url));
        }
        Ok(Self {
            name,
            url,
            transport,
            cover_minutes,
            fields,
            defaults,
        })
    }

    pub fn file_duration_secs(&self) -> u64 {
        self.defaults.file_duration.max(10)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.defaults.data_dir.join(&self.name)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.data_dir().join(".tmp")
    }
}
