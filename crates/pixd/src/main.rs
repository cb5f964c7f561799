//! pixd - drives the pix image cache with a synthetic scrolling workload

mod config;
mod library;
mod workload;

use anyhow::{Context, Result};
use clap::Parser;
use pixcache::{ImageCache, LoadCoordinator, PressureNotifier};
use pixmon::PerformanceMonitor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, Overrides};
use crate::library::SyntheticLibrary;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the performance log
    #[arg(short, long)]
    log_dir: Option<PathBuf>,

    /// Cache capacity (number of images)
    #[arg(long)]
    max_count: Option<usize>,

    /// Cache capacity (megabytes of decoded pixels)
    #[arg(long)]
    max_cost_mb: Option<usize>,

    /// Slow-operation threshold in milliseconds
    #[arg(long)]
    slow_ms: Option<u64>,

    /// Number of assets in the synthetic library
    #[arg(long)]
    assets: Option<usize>,

    /// Scroll steps to simulate
    #[arg(long)]
    steps: Option<usize>,

    /// Simulated decode latency in milliseconds
    #[arg(long)]
    latency_ms: Option<u64>,

    /// Make every n-th asset fail to decode
    #[arg(long)]
    fail_every: Option<usize>,

    /// Copy the performance log here when the run finishes
    #[arg(long)]
    export: Option<PathBuf>,

    /// Clear the performance log when the run finishes
    #[arg(long)]
    clear_logs: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            log_dir: self.log_dir.clone(),
            max_count: self.max_count,
            max_cost_mb: self.max_cost_mb,
            slow_ms: self.slow_ms,
            assets: self.assets,
            steps: self.steps,
            latency_ms: self.latency_ms,
            fail_every: self.fail_every,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    config.apply(args.overrides());

    info!("Starting pixd v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Cache limits: {} images, {} bytes",
        config.cache.max_count, config.cache.max_cost
    );

    let monitor = Arc::new(
        PerformanceMonitor::new(config.monitor.clone())
            .context("Failed to start performance monitor")?,
    );
    info!("Performance log: {:?}", monitor.log_file());

    let cache = Arc::new(ImageCache::new(config.cache)?);
    let notifier = Arc::new(PressureNotifier::new());
    let coordinator = Arc::new(
        LoadCoordinator::new(Arc::clone(&cache), Arc::clone(&monitor))
            .with_pressure_source(notifier.clone()),
    );
    listen_for_pressure(Arc::clone(&notifier))?;

    let library = Arc::new(SyntheticLibrary::new(
        Duration::from_millis(config.workload.decode_latency_ms),
        config.workload.fail_every,
    ));

    let report = workload::run(
        Arc::clone(&coordinator),
        Arc::clone(&library),
        &config.workload,
    )
    .await;

    let snapshot = cache.stats();
    let loads = coordinator.load_stats();
    info!(
        "Workload finished in {:.2?}: {} requests, {} loaded, {} failed",
        report.elapsed, report.requests, report.loaded, report.failed
    );
    info!(
        "Loads: {} cache hits, {} fetches, {} joined in flight, {} fetch failures, {} decodes",
        loads.cache_hits(),
        loads.fetches(),
        loads.joined(),
        loads.failures(),
        library.decodes()
    );
    info!(
        "Cache: {} images, {} bytes, hit ratio {:.2}, {} evictions",
        snapshot.count,
        snapshot.total_cost,
        cache.counters().hit_ratio(),
        cache.counters().evictions()
    );
    if monitor.dropped_lines() > 0 {
        warn!(
            "{} performance log line(s) dropped under load",
            monitor.dropped_lines()
        );
    }

    monitor
        .flush()
        .await
        .context("Failed to flush performance log")?;

    if let Some(path) = &args.export {
        std::fs::copy(monitor.log_file(), path)
            .context(format!("Failed to export performance log to {:?}", path))?;
        info!("Performance log exported to {:?}", path);
    }

    if args.clear_logs {
        monitor
            .clear_logs()
            .context("Failed to clear performance log")?;
        monitor.flush().await?;
        info!("Performance log cleared");
    }

    Ok(())
}

/// Treat SIGUSR1 as a low-memory warning
#[cfg(unix)]
fn listen_for_pressure(notifier: Arc<PressureNotifier>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut signals =
        signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
    tokio::spawn(async move {
        while signals.recv().await.is_some() {
            notifier.notify();
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn listen_for_pressure(_notifier: Arc<PressureNotifier>) -> Result<()> {
    Ok(())
}
