//! Deleter (§4.7 "3."): enforces the retention window by removing files
//! older than `cover` minutes from the oldest archived date directory.

use std::path::Path;

use chrono::{Local, NaiveDateTime};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;

/// One deleter pass: find the lexicographically smallest `YYYY-MM-DD/`
/// subdirectory of `data_dir` (skipping `.tmp`), and remove every file in
/// it whose parsed timestamp prefix is older than `cover_minutes`.
pub async fn run_once(config: &ChannelConfig, data_dir: &Path) {
    let mut dirs = match fs::read_dir(data_dir).await {
        Ok(dirs) => dirs,
        Err(e) => {
            warn!(channel = %config.name, "list data directory error: {e}");
            return;
        }
    };

    let mut smallest: Option<String> = None;
    loop {
        let entry = match dirs.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(channel = %config.name, "read data directory entry error: {e}");
                break;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == ".tmp" {
            continue;
        }
        if chrono::NaiveDate::parse_from_str(&name, "%Y-%m-%d").is_err() {
            debug!(channel = %config.name, dir = %name, "invalid directory name format, ignored");
            continue;
        }
        if smallest.as_deref().is_none_or(|s| name.as_str() < s) {
            smallest = Some(name);
        }
    }

    let Some(smallest) = smallest else {
        info!(channel = %config.name, "channel data directory not found");
        return;
    };

    let dir_path = data_dir.join(&smallest);
    let mut files = match fs::read_dir(&dir_path).await {
        Ok(files) => files,
        Err(e) => {
            warn!(channel = %config.name, dir = %dir_path.display(), "list channel data directory error: {e}");
            return;
        }
    };

    let now = Local::now().naive_local();
    let cover = chrono::Duration::minutes(config.cover_minutes as i64);
    let mut removed = 0u32;

    loop {
        let entry = match files.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(channel = %config.name, "read channel data directory entry error: {e}");
                break;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(created) = parse_prefix(&name, &config.defaults.time_layout) else {
            debug!(channel = %config.name, file = %name, "invalid file create time format, ignored");
            continue;
        };

        if now.signed_duration_since(created) > cover {
            let path = entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    info!(channel = %config.name, path = %path.display(), "remove file success");
                }
                Err(e) => warn!(channel = %config.name, path = %path.display(), "remove file error: {e}"),
            }
        }
    }

    if removed == 0 {
        debug!(channel = %config.name, "expired file not found in channel data directory");
    }
}

/// Parses the `<ts>_<name>` prefix this channel's mover stamped, using
/// exactly the configured `time_layout`'s rendered width rather than
/// splitting on the `_` separator (the templated suffix may itself
/// contain underscores).
fn parse_prefix(file_name: &str, time_layout: &str) -> Option<NaiveDateTime> {
    let sample_width = Local::now().naive_local().format(time_layout).to_string().len();
    let prefix = file_name.get(..sample_width)?;
    NaiveDateTime::parse_from_str(prefix, time_layout).ok()
}

/// Runs `run_once` on `check_delete_interval`, forever, until `stop_rx`
/// fires.
pub async fn run(config: &ChannelConfig, data_dir: &Path, mut stop_rx: tokio::sync::oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(config.defaults.check_delete_interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => run_once(config, data_dir).await,
            _ = &mut stop_rx => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageDefaults;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use tokio::fs as tfs;

    fn sample_config(cover_minutes: u64) -> ChannelConfig {
        ChannelConfig::new(
            "cam1".to_string(),
            "rtsp://127.0.0.1:554/cam1".to_string(),
            "tcp".to_string(),
            cover_minutes,
            HashMap::new(),
            StorageDefaults::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn removes_only_files_older_than_cover() {
        let root = TempDir::new().unwrap();
        let data_dir = root.path().join("cam1");
        let archive = data_dir.join("2024-01-01");
        tfs::create_dir_all(&archive).await.unwrap();

        let config = sample_config(60);
        let now = Local::now().naive_local();
        let old = now - ChronoDuration::minutes(90);
        let fresh = now - ChronoDuration::minutes(30);
        let old_name = format!("{}_clip.mp4", old.format(&config.defaults.time_layout));
        let fresh_name = format!("{}_clip.mp4", fresh.format(&config.defaults.time_layout));
        tfs::write(archive.join(&old_name), b"x").await.unwrap();
        tfs::write(archive.join(&fresh_name), b"x").await.unwrap();

        run_once(&config, &data_dir).await;

        assert!(!archive.join(&old_name).exists());
        assert!(archive.join(&fresh_name).exists());
    }

    #[tokio::test]
    async fn operates_on_lexicographically_smallest_directory_only() {
        let root = TempDir::new().unwrap();
        let data_dir = root.path().join("cam1");
        let older_dir = data_dir.join("2024-01-01");
        let newer_dir = data_dir.join("2024-01-02");
        tfs::create_dir_all(&older_dir).await.unwrap();
        tfs::create_dir_all(&newer_dir).await.unwrap();
        tfs::create_dir_all(data_dir.join(".tmp")).await.unwrap();

        let config = sample_config(0);
        let stamp = Local::now().naive_local() - ChronoDuration::minutes(5);
        let name = format!("{}_clip.mp4", stamp.format(&config.defaults.time_layout));
        tfs::write(newer_dir.join(&name), b"x").await.unwrap();

        run_once(&config, &data_dir).await;

        assert!(newer_dir.join(&name).exists());
    }
}
