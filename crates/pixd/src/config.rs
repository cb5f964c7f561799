//! Configuration file and CLI overrides

use anyhow::{Context, Result};
use pixcache::CacheLimits;
use pixmon::MonitorConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for the synthetic scroll workload
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Number of assets in the synthetic library
    pub assets: usize,
    /// Cells visible at once
    pub window: usize,
    /// Scroll steps to simulate
    pub steps: usize,
    /// Cells scrolled per step
    pub stride: usize,
    /// Thumbnail edge length in pixels
    pub thumb_size: u32,
    /// Simulated decode latency
    pub decode_latency_ms: u64,
    /// Every n-th asset fails to decode (0 disables)
    pub fail_every: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            assets: 500,
            window: 24,
            steps: 200,
            stride: 3,
            thumb_size: 200,
            decode_latency_ms: 15,
            fail_every: 0,
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheLimits,
    pub monitor: MonitorConfig,
    pub workload: WorkloadConfig,
}

/// Values given on the command line, applied over the file
#[derive(Debug, Default)]
pub struct Overrides {
    pub log_dir: Option<PathBuf>,
    pub max_count: Option<usize>,
    pub max_cost_mb: Option<usize>,
    pub slow_ms: Option<u64>,
    pub assets: Option<usize>,
    pub steps: Option<usize>,
    pub latency_ms: Option<u64>,
    pub fail_every: Option<usize>,
}

impl Config {
    /// Read `path` as JSON, or use defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&raw).context(format!("Failed to parse config file: {:?}", path))
    }

    /// Apply command-line overrides
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(dir) = overrides.log_dir {
            self.monitor.log_dir = dir;
        }
        if let Some(count) = overrides.max_count {
            self.cache.max_count = count;
        }
        if let Some(mb) = overrides.max_cost_mb {
            self.cache.max_cost = mb.saturating_mul(1024 * 1024);
        }
        if let Some(ms) = overrides.slow_ms {
            self.monitor.slow_threshold_ms = ms;
        }
        if let Some(assets) = overrides.assets {
            self.workload.assets = assets;
        }
        if let Some(steps) = overrides.steps {
            self.workload.steps = steps;
        }
        if let Some(ms) = overrides.latency_ms {
            self.workload.decode_latency_ms = ms;
        }
        if let Some(n) = overrides.fail_every {
            self.workload.fail_every = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = Config::load(None).unwrap();

        assert_eq!(config.cache, CacheLimits::default());
        assert_eq!(config.monitor.slow_threshold_ms, 100);
        assert_eq!(config.workload.assets, 500);
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pixd.json");
        fs::write(
            &path,
            r#"{ "cache": { "max_count": 50 }, "monitor": { "slow_threshold_ms": 250 } }"#,
        )
        .unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.cache.max_count, 50);
        assert_eq!(config.cache.max_cost, pixcache::DEFAULT_MAX_COST);
        assert_eq!(config.monitor.slow_threshold_ms, 250);
        assert_eq!(config.workload.window, 24);
    }

    #[test]
    fn test_bad_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pixd.json");
        fs::write(&path, "not json").unwrap();

        assert!(Config::load(Some(path.as_path())).is_err());
        assert!(Config::load(Some(dir.path().join("missing.json").as_path())).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply(Overrides {
            max_count: Some(10),
            max_cost_mb: Some(2),
            slow_ms: Some(5),
            fail_every: Some(7),
            ..Overrides::default()
        });

        assert_eq!(config.cache.max_count, 10);
        assert_eq!(config.cache.max_cost, 2 * 1024 * 1024);
        assert_eq!(config.monitor.slow_threshold_ms, 5);
        assert_eq!(config.workload.fail_every, 7);
        assert_eq!(config.workload.steps, 200);
    }
}
