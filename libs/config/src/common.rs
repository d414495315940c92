//! Config sections shared by both binaries: `http`, `log`, `service`,
//! `localize`, `version` (§6, §9b).

use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// HTTP control-plane listener (§6). `*_timeout` fields are left `None`
/// (meaning "axum/hyper default") unless the operator sets them, matching
/// the original's "default is http server default" comment on every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Http {
    pub host: String,
    pub port: u16,
    pub read_timeout_secs: Option<u64>,
    pub read_header_timeout_secs: Option<u64>,
    pub write_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub cors: bool,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8190,
            read_timeout_secs: None,
            read_header_timeout_secs: None,
            write_timeout_secs: None,
            idle_timeout_secs: None,
            cors: false,
        }
    }
}

impl Http {
    /// Resolved listen address, computed once at `finalize()` time rather
    /// than re-parsed on every request (§9 "PostHandle" pattern).
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid http listen address {}:{}", self.host, self.port))
    }
}

/// `tracing`'s env-filter directive, overridable by `RUST_LOG` (§9a).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Log {
    pub level: String,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Opaque passthrough for the OS-service-wrapper integration (§1, §9b):
/// this crate never interprets it, it just round-trips through
/// (de)serialization so the config file's `service:` section survives a
/// load/reload cycle for whatever external installer consumes it.
pub type ServiceConfig = serde_json::Value;

/// Field/tag-name → human string map, surfaced through a binary's
/// `AppError` validation-error variant (§9b "Localize map").
pub type Localize = HashMap<String, String>;

pub fn default_version() -> String {
    "v1.0.0".to_string()
}
