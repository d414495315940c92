//! MSU (Media Storage Unit) binary: records pulled RTSP streams to disk
//! via an external segmenter subprocess, with a mover/deleter pair
//! archiving and retiring finished segments (§1, §2, §4.7).
//!
//! Grounded on `tools/whipinto/src/main.rs`'s `clap` + verbosity-to-level
//! mapping and `liveion/src/lib.rs::server_up`'s axum/tracing/graceful-
//! shutdown assembly, same as `apps/mdu`.

mod error;
mod metrics;
mod route;
mod state;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use clap::Parser;
use mdu_msu_config::ConfigHandle;
use mdu_msu_config::msu::Config;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

use state::AppState;

#[derive(Parser)]
#[command(author, version, about = "Media Storage Unit", long_about = None)]
struct Args {
    /// Path to the YAML/JSON config file.
    #[arg(short, long, default_value = "msu.yaml")]
    config: String,
    /// Verbose mode [default: config's log.level, -v "debug", -vv "trace"].
    #[arg(short = 'v', action = clap::ArgAction::Count, default_value_t = 0)]
    verbose: u8,
}

fn build_filter(cfg: &Config, verbose: u8) -> EnvFilter {
    let level = match verbose {
        0 => cfg.log.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("msu={level},recorder={level}")))
}

/// Installs the global subscriber behind a `reload::Layer` so a config
/// reload can rewire the log level without restarting the process
/// (SPEC_FULL.md §9b "Config reload callbacks"). Returns the handle the
/// watcher task in `main` uses to apply subsequent reloads.
fn install_tracing(cfg: &Config, verbose: u8) -> reload::Handle<EnvFilter, Registry> {
    let (filter, handle) = reload::Layer::new(build_filter(cfg, verbose));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    handle
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match ConfigHandle::<Config>::load(&args.config) {
        Ok(handle) => Arc::new(handle),
        Err(e) => {
            eprintln!("failed to load config {}: {e:#}", args.config);
            std::process::exit(1);
        }
    };

    let reload_handle = install_tracing(&config.current(), args.verbose);
    info!(config = %args.config, "msu starting");

    {
        let mut rx = config.subscribe();
        let verbose = args.verbose;
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let cfg = rx.borrow().clone();
                match reload_handle.reload(build_filter(&cfg, verbose)) {
                    Ok(()) => info!(level = %cfg.log.level, "log level updated after config reload"),
                    Err(e) => error!("failed to rewire log level after reload: {e}"),
                }
            }
        });
    }

    if let Err(e) = run(config).await {
        error!("msu exited with error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(config: Arc<ConfigHandle<Config>>) -> Result<()> {
    let cfg = config.current();
    let state = AppState::new(config.clone());

    let app = Router::new()
        .merge(route::route())
        .with_state(state)
        .layer(if cfg.http.cors {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        })
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cfg.http.addr()?).await?;
    info!(addr = %listener.local_addr()?, "HTTP control plane listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    warn!("msu shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
