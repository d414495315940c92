//! MDU (Media Distribution Unit) binary: pulls upstream RTSP streams and
//! re-publishes them to downstream subscribers (§1, §2).
//!
//! Grounded on `tools/whipinto/src/main.rs`'s `clap` + verbosity-to-level
//! mapping and `liveion/src/lib.rs::server_up`'s axum/tracing/graceful-
//! shutdown assembly.

mod error;
mod metrics;
mod puller;
mod route;
mod state;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use clap::Parser;
use mdu_msu_config::ConfigHandle;
use mdu_msu_config::mdu::Config;
use streamhub::{Server, ServerConfig};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

use puller::PullerRegistry;
use state::AppState;

#[derive(Parser)]
#[command(author, version, about = "Media Distribution Unit", long_about = None)]
struct Args {
    /// Path to the YAML/JSON config file.
    #[arg(short, long, default_value = "mdu.yaml")]
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
        .unwrap_or_else(|_| EnvFilter::new(format!("mdu={level},rtsp={level},streamhub={level}")))
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
            // Tracing isn't installed yet (we need the config to know the
            // level); a config load failure is fatal regardless (§6, §7).
            eprintln!("failed to load config {}: {e:#}", args.config);
            std::process::exit(1);
        }
    };

    let reload_handle = install_tracing(&config.current(), args.verbose);
    info!(config = %args.config, "mdu starting");

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
        error!("mdu exited with error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(config: Arc<ConfigHandle<Config>>) -> Result<()> {
    let cfg = config.current();
    let credentials = if cfg.rtsp.enable_authorization {
        Some((cfg.rtsp.username.clone(), cfg.rtsp.password.clone()))
    } else {
        None
    };

    let server = Server::new(ServerConfig {
        listen_addr: cfg.rtsp.addr()?,
        credentials,
        realm: cfg.rtsp.realm.clone(),
        close_old: cfg.rtsp.close_old,
        gop_cache: !cfg.rtsp.pusher.disable_gop_cache,
        player: streamhub::PlayerConfig {
            queue_limit: cfg.rtsp.player.queue_limit,
            drop_packet_when_paused: cfg.rtsp.player.drop_packet_when_paused,
        },
        video_buf_sizes: rtsp::SocketBufSizes {
            recv: cfg.rtsp.video.server.read_buffer,
            send: cfg.rtsp.video.server.write_buffer,
        },
        audio_buf_sizes: rtsp::SocketBufSizes {
            recv: cfg.rtsp.audio.server.read_buffer,
            send: cfg.rtsp.audio.server.write_buffer,
        },
    });

    {
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("RTSP server stopped: {e:#}");
            }
        });
    }

    let state = AppState {
        config: config.clone(),
        server,
        pullers: PullerRegistry::new(),
    };

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
    warn!("mdu shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
