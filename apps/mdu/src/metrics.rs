//! Process-wide Prometheus registry for the `/metrics` route (§6, §9a;
//! grounded on the teacher's `src/metrics.rs` lazy-static gauges,
//! translated to `once_cell::sync::Lazy` since this registry is
//! installed once at startup and never reconstructed).

use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> =
    Lazy::new(|| Registry::new_custom(Some("mdu".to_string()), None).unwrap());

pub static PUSHERS: Lazy<Gauge> = Lazy::new(|| {
    let g = Gauge::new("pushers", "number of live pushers").unwrap();
    REGISTRY.register(Box::new(g.clone())).unwrap();
    g
});

pub static PLAYERS: Lazy<Gauge> = Lazy::new(|| {
    let g = Gauge::new("players", "number of attached players").unwrap();
    REGISTRY.register(Box::new(g.clone())).unwrap();
    g
});

pub fn encode() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    encoder.encode(&metric_families, &mut buf).ok();
    String::from_utf8(buf).unwrap_or_default()
}
