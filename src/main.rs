//! Toll booth demo host
//!
//! Runs the toll engine against the in-memory world at the configured tick
//! rate until Ctrl+C, then prints a report per booth.
//!
//! Module structure:
//! - `domain/` - Core types (VehicleType, CapabilitySet, Passage)
//! - `io/` - Host boundary, in-memory world, egress, reporting
//! - `services/` - Engine, tracker, barrier, pricing, statistics
//! - `infra/` - Config, Metrics

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tollbooth::infra::{Config, Metrics};
use tollbooth::io::SimWorld;
use tollbooth::services::{TollEngine, TollPricingTable};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// How often the config file is checked for pricing changes
const PRICING_RELOAD_POLL: Duration = Duration::from_secs(2);

/// Toll booth simulation host
#[derive(Parser, Debug)]
#[command(name = "tollbooth", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default INFO level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "tollbooth starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        ticks_per_second = %config.ticks_per_second(),
        processing_ticks = %config.processing_duration_ticks(),
        detection_threshold = %config.detection_threshold(),
        control_interval = %config.control_interval_ticks(),
        throttle = %config.throttle_enabled(),
        peak_policy = ?config.pricing().peak_policy,
        egress_file = %config.egress_file(),
        booths = %config.simulation().booths,
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let pricing = Arc::new(TollPricingTable::new(config.pricing().clone()));

    // Metrics reporter
    let reporter_metrics = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let mut reporter_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = reporter_shutdown.changed() => {
                    if *reporter_shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => reporter_metrics.report().log(),
            }
        }
    });

    // Pricing hot reload
    let reload_path = PathBuf::from(config.config_file());
    if reload_path.is_file() {
        let reload_pricing = pricing.clone();
        let reload_shutdown = shutdown_rx.clone();
        tokio::spawn(watch_pricing(reload_path, reload_pricing, reload_shutdown));
    }

    // Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let mut world = SimWorld::from_config(config.simulation());
    let mut engine = TollEngine::with_pricing(config, pricing, metrics.clone());
    engine.run(&mut world, shutdown_rx).await;

    for report in engine.report_handle().reports() {
        info!(report = %report.to_json(), "booth_report");
    }
    metrics.report().log();

    info!("tollbooth shutdown complete");
    Ok(())
}

/// Re-read the pricing section whenever the config file changes on disk
async fn watch_pricing(
    path: PathBuf,
    pricing: Arc<TollPricingTable>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last_modified = modified_at(&path).ok();
    let mut interval = tokio::time::interval(PRICING_RELOAD_POLL);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                let modified = match modified_at(&path) {
                    Ok(modified) => modified,
                    Err(e) => {
                        warn!(error = %format!("{e:#}"), "pricing_reload_stat_failed");
                        continue;
                    }
                };
                if last_modified == Some(modified) {
                    continue;
                }
                last_modified = Some(modified);

                match Config::from_file(&path) {
                    Ok(config) => pricing.reload(config.pricing().clone()),
                    Err(e) => warn!(error = %format!("{e:#}"), "pricing_reload_failed"),
                }
            }
        }
    }
}

fn modified_at(path: &Path) -> anyhow::Result<SystemTime> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat config file {}", path.display()))?;
    metadata.modified().context("File modification time unavailable")
}
