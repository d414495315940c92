//! Process-wide Prometheus registry for the `/metrics` route (§6, §9a),
//! same shape as `apps/mdu`'s (grounded on the teacher's `src/metrics.rs`).

use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> =
    Lazy::new(|| Registry::new_custom(Some("msu".to_string()), None).unwrap());

pub static CHANNELS: Lazy<Gauge> = Lazy::new(|| {
    let g = Gauge::new("channels", "number of recording channels").unwrap();
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
