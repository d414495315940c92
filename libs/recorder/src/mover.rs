//! Mover (§4.7 "2."): moves completed segments out of `.tmp/` into the
//! date-partitioned archive, deliberately leaving the most-recent file
//! behind since the segmenter may still be writing it.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::template;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

struct Candidate {
    created: NaiveDateTime,
    src: PathBuf,
    target_dir: PathBuf,
    target: PathBuf,
}

/// One mover pass: scan `tmp_dir`, compute the maximum in-progress
/// timestamp, and rename every older candidate into `data_dir`.
pub async fn run_once(config: &ChannelConfig, data_dir: &Path, tmp_dir: &Path) {
    let mut entries = match fs::read_dir(tmp_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(channel = %config.name, "list tmp directory error: {e}");
            return;
        }
    };

    let suffix = format!(".{}", config.defaults.file_format);
    let mut candidates = Vec::new();
    let mut max_time: Option<NaiveDateTime> = None;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(channel = %config.name, "read tmp directory entry error: {e}");
                break;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(stem) = name.strip_suffix(&suffix) else {
            debug!(channel = %config.name, file = %name, "invalid file name format, ignored");
            continue;
        };
        let Ok(created) = NaiveDateTime::parse_from_str(stem, TIMESTAMP_FORMAT) else {
            debug!(channel = %config.name, file = %name, "invalid file name format, ignored");
            continue;
        };

        if max_time.is_none_or(|max| created > max) {
            max_time = Some(created);
        }

        let mut fields = config.fields.clone();
        fields.insert("channel".to_string(), config.name.clone());
        fields.insert("suffix".to_string(), config.defaults.file_format.clone());
        let rendered = template::render(&config.defaults.file_name, &fields);
        let file_name = format!("{}_{}", created.format(&config.defaults.time_layout), rendered);
        let target_dir_name = created.format("%Y-%m-%d").to_string();
        let target_dir = data_dir.join(&target_dir_name);

        candidates.push(Candidate {
            created,
            src: entry.path(),
            target: target_dir.join(file_name),
            target_dir,
        });
    }

    let Some(max_time) = max_time else { return };

    for candidate in candidates {
        if candidate.created >= max_time {
            debug!(channel = %config.name, src = %candidate.src.display(), "ignore move latest time file");
            continue;
        }
        if let Err(e) = fs::create_dir_all(&candidate.target_dir).await {
            warn!(channel = %config.name, dir = %candidate.target_dir.display(), "ensure target directory error: {e}");
            continue;
        }
        match fs::rename(&candidate.src, &candidate.target).await {
            Ok(()) => info!(channel = %config.name, src = %candidate.src.display(), target = %candidate.target.display(), "move file success"),
            Err(e) => warn!(channel = %config.name, src = %candidate.src.display(), target = %candidate.target.display(), "move file error: {e}"),
        }
    }
}

/// Runs `run_once` on `move_interval`, forever, until `stop_rx` fires.
pub async fn run(config: &ChannelConfig, data_dir: &Path, tmp_dir: &Path, mut stop_rx: tokio::sync::oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(config.defaults.move_interval);
    ticker.tick().await; // first tick fires immediately; consume it up front
    loop {
        tokio::select! {
            _ = ticker.tick() => run_once(config, data_dir, tmp_dir).await,
            _ = &mut stop_rx => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageDefaults;
    use std::collections::HashMap as Map;
    use tempfile::TempDir;
    use tokio::fs as tfs;

    fn sample_config() -> ChannelConfig {
        ChannelConfig::new(
            "cam1".to_string(),
            "rtsp://127.0.0.1:554/cam1".to_string(),
            "tcp".to_string(),
            60,
            Map::new(),
            StorageDefaults::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn moves_all_but_the_maximum_timestamp_file() {
        let root = TempDir::new().unwrap();
        let data_dir = root.path().join("cam1");
        let tmp_dir = data_dir.join(".tmp");
        tfs::create_dir_all(&tmp_dir).await.unwrap();

        for name in ["20240101120000.mp4", "20240101121000.mp4", "20240101122000.mp4"] {
            tfs::write(tmp_dir.join(name), b"x").await.unwrap();
        }

        let config = sample_config();
        run_once(&config, &data_dir, &tmp_dir).await;

        let archived = data_dir.join("2024-01-01");
        let mut dir = tfs::read_dir(&archived).await.unwrap();
        let mut moved = Vec::new();
        while let Some(entry) = dir.next_entry().await.unwrap() {
            moved.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(moved.len(), 2);

        let remaining: Vec<String> = {
            let mut dir = tfs::read_dir(&tmp_dir).await.unwrap();
            let mut out = Vec::new();
            while let Some(entry) = dir.next_entry().await.unwrap() {
                out.push(entry.file_name().to_string_lossy().into_owned());
            }
            out
        };
        assert_eq!(remaining, vec!["20240101122000.mp4".to_string()]);
    }

    #[tokio::test]
    async fn running_twice_is_idempotent() {
        let root = TempDir::new().unwrap();
        let data_dir = root.path().join("cam1");
        let tmp_dir = data_dir.join(".tmp");
        tfs::create_dir_all(&tmp_dir).await.unwrap();
        for name in ["20240101120000.mp4", "20240101121000.mp4"] {
            tfs::write(tmp_dir.join(name), b"x").await.unwrap();
        }

        let config = sample_config();
        run_once(&config, &data_dir, &tmp_dir).await;
        run_once(&config, &data_dir, &tmp_dir).await;

        let archived = data_dir.join("2024-01-01");
        let mut dir = tfs::read_dir(&archived).await.unwrap();
        let mut count = 0;
        while dir.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn ignores_and_leaves_non_matching_file_names() {
        let root = TempDir::new().unwrap();
        let data_dir = root.path().join("cam1");
        let tmp_dir = data_dir.join(".tmp");
        tfs::create_dir_all(&tmp_dir).await.unwrap();
        tfs::write(tmp_dir.join("20240101120000.mp4"), b"x").await.unwrap();
        tfs::write(tmp_dir.join("not-a-segment.txt"), b"x").await.unwrap();

        let config = sample_config();
        run_once(&config, &data_dir, &tmp_dir).await;

        assert!(tmp_dir.join("not-a-segment.txt").exists());
    }
}
