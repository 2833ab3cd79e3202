//! rportd-fleet - client-fleet control plane.
//!
//! Wires up configuration, durable storage, the shared `Fleet` state, and
//! the background reaper. Authentication, authorization, and dispatch are
//! library-level (`identity`, `authz`, `dispatch`) and consumed by whatever
//! transport/API layer embeds this crate — that layer is out of scope here
//! (spec.md §1).

use rportd_fleet::config::Config;
use rportd_fleet::db::Database;
use rportd_fleet::reaper;
use rportd_fleet::state::Fleet;
use rportd_fleet::{config, metrics};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `rportd.toml` when no argument is provided.
fn resolve_config_path() -> PathBuf {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "rportd.toml".to_string(),
    };

    PathBuf::from(raw_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();

    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: failed to load config from {}: {}", config_path.display(), e);
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.server.log_format() {
        config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        config::LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    if let Err(errors) = config::validate(&config) {
        for err in &errors {
            error!(error = %err, "configuration validation failed");
        }
        return Err(anyhow::anyhow!(
            "configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    info!(server = %config.server.name, "starting rportd-fleet");

    metrics::init();
    info!("metrics initialized");

    let db = Database::new(&config.database.path).await?;
    info!(path = %config.database.path, "database opened");

    let fleet = Arc::new(Fleet::new(config, db).await?);
    let now = chrono::Utc::now();
    info!(
        active = fleet.clients.count_active(),
        disconnected = fleet.clients.count_disconnected(now, fleet.keep_disconnected_clients()),
        "fleet state warmed from storage"
    );

    let (reaper_handle, reaper_shutdown) = reaper::spawn(fleet.clone());
    info!("reaper task started");

    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .expect("failed to install SIGINT handler");
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }

    let _ = reaper_shutdown.send(true);
    let _ = reaper_handle.await;

    info!("rportd-fleet stopped");
    Ok(())
}
