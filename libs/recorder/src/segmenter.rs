//! Segmenter subprocess supervisor (§4.7 "1."). Launches an external
//! `ffmpeg`-shaped process that writes fixed-duration segments into
//! `.tmp/`, restarting it after `exit-restart-interval` whenever it
//! exits, and tearing it down with an interrupt-then-kill sequence on
//! close.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::ChannelConfig;

/// Build the argument list for one segmenter invocation (§4.7): input
/// transport and URL, stream-copy, segment muxer, strftime-named output
/// pattern rooted at `tmp_dir`.
fn build_args(config: &ChannelConfig, tmp_dir: &Path) -> Vec<String> {
    let pattern = tmp_dir.join(format!("%Y%m%d%H%M%S.{}", config.defaults.file_format));
    vec![
        "-rtsp_transport".to_string(),
        config.transport.clone(),
        "-i".to_string(),
        config.url.clone(),
        "-codec".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        "segment".to_string(),
        "-strftime".to_string(),
        "1".to_string(),
        "-segment_time".to_string(),
        config.file_duration_secs().to_string(),
        "-segment_format".to_string(),
        config.defaults.file_format.clone(),
        pattern.to_string_lossy().into_owned(),
    ]
}

fn spawn_child(config: &ChannelConfig, tmp_dir: &Path) -> std::io::Result<Child> {
    let args = build_args(config, tmp_dir);
    Command::new(&config.defaults.ffmpeg.bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
}

/// Send the process an interrupt signal, falling back to `start_kill`
/// where no interrupt signal exists (§4.7 "On close: sends interrupt
/// signal; if still alive after `interrupt-timeout`, force-kills").
#[cfg(unix)]
fn interrupt(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: `pid` is the live child's own pid as reported by the
        // kernel via `tokio::process::Child::id`; sending it SIGINT has
        // no effect beyond the target process observing the signal.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGINT);
        }
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) {
    // No portable "ask nicely" signal on this platform; the caller's
    // interrupt-timeout fallback to `start_kill` handles shutdown.
}

/// Runs until `stop_rx` fires, restarting the segmenter process
/// indefinitely on its own exit (§4.7, §7 "Transient I/O").
pub async fn run(config: &ChannelConfig, tmp_dir: &Path, mut stop_rx: oneshot::Receiver<()>) {
    let channel = config.name.as_str();
    loop {
        let mut child = match spawn_child(config, tmp_dir) {
            Ok(child) => {
                info!(channel, bin = %config.defaults.ffmpeg.bin, "segmenter started");
                child
            }
            Err(e) => {
                warn!(channel, "segmenter start error: {e}");
                tokio::select! {
                    _ = sleep(config.defaults.ffmpeg.exit_restart_interval) => continue,
                    _ = &mut stop_rx => return,
                }
            }
        };

        tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) if status.success() => info!(channel, "segmenter exited"),
                    Ok(status) => warn!(channel, "segmenter exited with {status}"),
                    Err(e) => warn!(channel, "segmenter wait error: {e}"),
                }
                sleep(config.defaults.ffmpeg.exit_restart_interval).await;
            }
            _ = &mut stop_rx => {
                info!(channel, "stopping segmenter");
                interrupt(&child);
                tokio::select! {
                    _ = child.wait() => {}
                    _ = sleep(config.defaults.ffmpeg.interrupt_timeout) => {
                        warn!(channel, "interrupt timeout, killing segmenter");
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                    }
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageDefaults;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn sample_config() -> ChannelConfig {
        ChannelConfig::new(
            "cam1".to_string(),
            "rtsp://127.0.0.1:554/cam1".to_string(),
            "tcp".to_string(),
            60,
            HashMap::new(),
            StorageDefaults::default(),
        )
        .unwrap()
    }

    #[test]
    fn args_include_transport_url_and_pattern() {
        let config = sample_config();
        let args = build_args(&config, &PathBuf::from("/data/cam1/.tmp"));
        assert!(args.windows(2).any(|w| w == ["-rtsp_transport", "tcp"]));
        assert!(args.windows(2).any(|w| w == ["-i", "rtsp://127.0.0.1:554/cam1"]));
        assert!(args.last().unwrap().ends_with("%Y%m%d%H%M%S.mp4"));
    }

    #[test]
    fn file_duration_floors_to_ten_seconds() {
        let mut config = sample_config();
        config.defaults.file_duration = 3;
        assert_eq!(config.file_duration_secs(), 10);
    }
}
