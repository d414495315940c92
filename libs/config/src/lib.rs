//! Layered YAML/JSON configuration for the MDU and MSU binaries (§6, §9).
//!
//! A config struct's `Default` impl is the "PreHandle" equivalent --
//! every field has a sensible value before a file is even read -- and its
//! `Finalize::finalize` is the "PostHandle" equivalent, run once top-down
//! after deserialization to resolve derived fields (parsed
//! `SocketAddr`s) and reject invalid combinations. There is no generic
//! reflective visitor: the field set is static and known at compile time,
//! so each binary's top-level `Config` just calls `finalize()` on itself
//! and its sub-sections in order.

pub mod common;
pub mod mdu;
pub mod msu;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

pub use common::{Http, Localize, Log, ServiceConfig, default_version};

/// Files larger than this are rejected before parsing (§6, §7 "Config").
pub const MAX_CONFIG_FILE_SIZE: u64 = 32 * 1024 * 1024;

/// The "PostHandle" equivalent: resolve derived fields and validate
/// value ranges once, after `serde` has filled in defaults for whatever
/// the file omitted.
pub trait Finalize {
    fn finalize(&mut self) -> Result<()>;
}

/// Which unmarshaler to try first, sniffed from the file extension.
/// Falls back to trying every known encoding in turn when the extension
/// is absent or unrecognized, mirroring `original_source/common/config/
/// config.go`'s `ProbeType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Yaml,
    Json,
    Toml,
}

fn probe_encoding(path: &Path) -> Option<Encoding> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Some(Encoding::Yaml),
        Some("json") => Some(Encoding::Json),
        Some("toml") => Some(Encoding::Toml),
        _ => None,
    }
}

/// Deserialize `text` as `T`, trying the extension-sniffed encoding
/// first and falling back to every other known encoding in a fixed
/// order before giving up (§9 "Reflection-based config default-fill").
fn parse_any<T: DeserializeOwned>(path: &Path, text: &str) -> Result<T> {
    let order = match probe_encoding(path) {
        Some(enc) => {
            let mut rest = vec![Encoding::Yaml, Encoding::Json, Encoding::Toml];
            rest.retain(|e| *e != enc);
            let mut v = vec![enc];
            v.extend(rest);
            v
        }
        None => vec![Encoding::Yaml, Encoding::Json, Encoding::Toml],
    };

    let mut last_err = None;
    for enc in order {
        let result = match enc {
            Encoding::Yaml => serde_yaml::from_str::<T>(text).map_err(anyhow::Error::from),
            Encoding::Json => serde_json::from_str::<T>(text).map_err(anyhow::Error::from),
            Encoding::Toml => toml::from_str::<T>(text).map_err(anyhow::Error::from),
        };
        match result {
            Ok(v) => return Ok(v),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no encoding available")))
}

/// Read, size-check and parse `path` as `T`, then call `finalize` once.
/// This is the one entry point both binaries use for their top-level
/// config struct -- `main()` calls `exit(1)` on `Err` per §6/§7.
pub fn load<T: DeserializeOwned + Finalize>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("reading config file metadata: {}", path.display()))?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        bail!(
            "config file {} is {} bytes, exceeding the {} byte limit",
            path.display(),
            metadata.len(),
            MAX_CONFIG_FILE_SIZE
        );
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file: {}", path.display()))?;
    let mut cfg: T =
        parse_any(path, &text).with_context(|| format!("parsing config file: {}", path.display()))?;
    cfg.finalize().context("validating config")?;
    Ok(cfg)
}

/// Process-wide handle to the hot-reloadable config, installed once at
/// startup and read-only thereafter except for the atomic pointer swap
/// `reload` performs (§9 "Global singletons").
///
/// Subsystems that care about a reload (today: the log level -- the
/// listen address is deliberately *not* hot-swapped, matching §9b's
/// "Config reload callbacks" note) subscribe via [`ConfigHandle::subscribe`]
/// instead of polling `current()` on a timer.
pub struct ConfigHandle<T> {
    current: ArcSwap<T>,
    path: std::path::PathBuf,
    tx: watch::Sender<Arc<T>>,
}

impl<T: DeserializeOwned + Finalize + 'static> ConfigHandle<T> {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cfg = Arc::new(load::<T>(&path)?);
        let (tx, _rx) = watch::channel(cfg.clone());
        Ok(Self {
            current: ArcSwap::new(cfg),
            path,
            tx,
        })
    }

    pub fn current(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Re-read the config file from disk and swap the pointer, notifying
    /// every [`watch::Receiver`] handed out by [`Self::subscribe`].
    /// Invoked by the `/restart` / `/sys/restart` HTTP handler (§6).
    pub fn reload(&self) -> Result<()> {
        let cfg = Arc::new(load::<T>(&self.path)?);
        self.current.store(cfg.clone());
        let _ = self.tx.send(cfg);
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        name: String,
        port: u16,
    }

    impl Finalize for Sample {
        fn finalize(&mut self) -> Result<()> {
            if self.port == 0 {
                self.port = 8080;
            }
            Ok(())
        }
    }

    #[test]
    fn loads_yaml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        std::fs::write(&path, "name: test\nport: 9090\n").unwrap();
        let cfg: Sample = load(&path).unwrap();
        assert_eq!(cfg.name, "test");
        assert_eq!(cfg.port, 9090);
    }

    #[test]
    fn loads_json_by_content_when_extension_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.conf");
        std::fs::write(&path, r#"{"name":"test","port":1234}"#).unwrap();
        let cfg: Sample = load(&path).unwrap();
        assert_eq!(cfg.name, "test");
        assert_eq!(cfg.port, 1234);
    }

    #[test]
    fn finalize_runs_after_deserialization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        std::fs::write(&path, "name: test\n").unwrap();
        let cfg: Sample = load(&path).unwrap();
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        let big = "name: ".to_string() + &"a".repeat((MAX_CONFIG_FILE_SIZE as usize) + 1);
        std::fs::write(&path, big).unwrap();
        let err = load::<Sample>(&path).unwrap_err();
        assert!(err.to_string().contains("exceeding"));
    }

    #[tokio::test]
    async fn reload_notifies_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        std::fs::write(&path, "name: one\nport: 1\n").unwrap();
        let handle = ConfigHandle::<Sample>::load(&path).unwrap();
        let mut rx = handle.subscribe();

        std::fs::write(&path, "name: two\nport: 2\n").unwrap();
        handle.reload().unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().name, "two");
        assert_eq!(handle.current().name, "two");
    }
}
