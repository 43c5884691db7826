//! hopperd server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use hopper_core::config::AppConfig;
use hopper_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// hopperd - chunked upload assembler
#[derive(Parser, Debug)]
#[command(name = "hopperd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "HOPPER_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("hopperd v{}", env!("CARGO_PKG_VERSION"));

    // Config file is optional; env vars can provide or override everything.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("HOPPER_") && key != "HOPPER_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: hopperd --config /path/to/config.toml\n  \
             2. Environment variables: HOPPER_SERVER__BIND=0.0.0.0:8080 \
             HOPPER_AUTH__TOKEN_HASH=YOUR_SHA256_HEX hopperd\n\n\
             See config/server.example.toml for example configuration.\n\
             Set HOPPER_CONFIG env var to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("HOPPER_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    hopper_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let store = hopper_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;

    // Fail fast rather than report healthy with unwritable storage.
    store
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = store.backend_name(), "Storage backend ready");

    let state = AppState::new(config.clone(), store);

    if config.gc.purge_orphans_on_startup {
        let stats = state
            .assembler
            .purge_orphaned_staging()
            .await
            .context("failed to purge orphaned staging artifacts")?;
        tracing::info!(
            orphans_removed = stats.orphans_removed,
            bytes_reclaimed = stats.bytes_reclaimed,
            "Startup staging purge complete"
        );
    }

    let _sweeper = state.assembler.clone().spawn_sweeper();
    tracing::info!(
        interval_secs = config.gc.sweep_interval_secs,
        idle_timeout_secs = config.gc.idle_timeout_secs,
        "Idle session sweeper spawned"
    );

    let app = create_router(state);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
