//! Synthetic scrolling workload
//!
//! A window of visible cells bounces back and forth over the library. Every
//! visible cell is requested twice per step (layout pass plus display), so
//! both the cache and the in-flight deduplication get exercised.

use crate::config::WorkloadConfig;
use crate::library::SyntheticLibrary;
use pixcache::{CacheKey, LoadCoordinator, TargetSize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Totals for one workload run
#[derive(Debug, Default)]
pub struct WorkloadReport {
    pub requests: usize,
    pub loaded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// First visible cell at `step`
fn window_start(step: usize, config: &WorkloadConfig) -> usize {
    let span = config.assets.saturating_sub(config.window);
    if span == 0 {
        return 0;
    }

    let pos = step.wrapping_mul(config.stride) % (2 * span);
    if pos <= span {
        pos
    } else {
        2 * span - pos
    }
}

pub async fn run(
    coordinator: Arc<LoadCoordinator>,
    library: Arc<SyntheticLibrary>,
    config: &WorkloadConfig,
) -> WorkloadReport {
    let size = TargetSize::new(config.thumb_size, config.thumb_size);
    let monitor = Arc::clone(coordinator.monitor());
    let started = Instant::now();
    let mut report = WorkloadReport::default();

    for step in 0..config.steps {
        let start = window_start(step, config);
        let end = (start + config.window).min(config.assets);

        let outcomes = monitor
            .measure_async("scroll step", async {
                let handles: Vec<_> = (start..end)
                    .flat_map(|index| [index, index])
                    .map(|index| {
                        let coordinator = Arc::clone(&coordinator);
                        let library = Arc::clone(&library);
                        let key = CacheKey::new(SyntheticLibrary::asset_id(index), size);
                        tokio::spawn(async move {
                            coordinator
                                .load(key, move |asset_id, size| library.fetch(asset_id, size))
                                .await
                        })
                    })
                    .collect();

                let mut outcomes = Vec::with_capacity(handles.len());
                for handle in handles {
                    outcomes.push(handle.await.ok().flatten());
                }
                outcomes
            })
            .await;

        let loaded = outcomes.iter().filter(|o| o.is_some()).count();
        debug!("Step {}: cells {}..{}, {} loaded", step, start, end, loaded);

        report.requests += outcomes.len();
        report.loaded += loaded;
        report.failed += outcomes.len() - loaded;
    }

    report.elapsed = started.elapsed();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixcache::{CacheLimits, ImageCache};
    use pixmon::{MonitorConfig, PerformanceMonitor};
    use tempfile::TempDir;

    fn small_config() -> WorkloadConfig {
        WorkloadConfig {
            assets: 30,
            window: 6,
            steps: 12,
            stride: 2,
            thumb_size: 4,
            decode_latency_ms: 1,
            fail_every: 0,
        }
    }

    #[test]
    fn test_window_bounces() {
        let config = small_config();
        let starts: Vec<_> = (0..30).map(|step| window_start(step, &config)).collect();

        assert_eq!(starts[0], 0);
        assert_eq!(starts[12], 24);
        assert_eq!(starts[13], 22);
        assert!(starts.iter().all(|&s| s + config.window <= config.assets));
    }

    #[test]
    fn test_window_larger_than_library() {
        let config = WorkloadConfig {
            assets: 4,
            ..small_config()
        };
        assert_eq!(window_start(5, &config), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_deduplicates() {
        let dir = TempDir::new().unwrap();
        let config = WorkloadConfig {
            fail_every: 10,
            ..small_config()
        };
        let cache = Arc::new(ImageCache::new(CacheLimits::default()).unwrap());
        let monitor =
            Arc::new(PerformanceMonitor::new(MonitorConfig::with_log_dir(dir.path())).unwrap());
        let coordinator = Arc::new(LoadCoordinator::new(cache, monitor));
        let library = Arc::new(SyntheticLibrary::new(
            Duration::from_millis(config.decode_latency_ms),
            config.fail_every,
        ));

        let report = run(Arc::clone(&coordinator), Arc::clone(&library), &config).await;

        assert_eq!(report.requests, 12 * 6 * 2);
        assert_eq!(report.loaded + report.failed, report.requests);
        assert!(report.failed > 0);
        assert_eq!(library.decodes(), coordinator.load_stats().fetches());
        assert!(library.decodes() < report.requests as u64);
        assert_eq!(coordinator.in_flight(), 0);
    }
}
