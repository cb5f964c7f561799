//! PerformanceMonitor: named-operation timing with a durable log
//!
//! Every measurement is identified by an [`OperationId`] made of the
//! operation name and a random suffix, so overlapping operations with the
//! same name are timed independently. Ending a measurement always goes
//! through the id handed out by [`PerformanceMonitor::start`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ahash::RandomState;
use chrono::Local;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::writer::{claim_log_file, LogWriter, STARTED_MARKER};

/// Default slow-operation threshold in milliseconds
pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 100;

/// Default capacity of the log write queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Directory holding the performance log
    pub log_dir: PathBuf,

    /// Operations slower than this are flagged with a warning line
    pub slow_threshold_ms: u64,

    /// Maximum number of queued log lines before new lines are dropped
    pub queue_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_dir: std::env::temp_dir().join("pixmon"),
            slow_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl MonitorConfig {
    /// Config writing into `log_dir` with default thresholds
    pub fn with_log_dir<P: AsRef<Path>>(log_dir: P) -> Self {
        Self {
            log_dir: log_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Check the config for values the monitor cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Correlation id of one live measurement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId(String);

impl OperationId {
    fn generate(name: &str) -> Self {
        Self(format!("{}-{}", name, Uuid::new_v4().simple()))
    }

    /// The id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct Timer {
    name: String,
    started: Instant,
}

/// Times named operations and appends the results to a per-run log file
pub struct PerformanceMonitor {
    timers: Mutex<HashMap<OperationId, Timer, RandomState>>,
    writer: LogWriter,
    slow_threshold: Duration,
}

impl PerformanceMonitor {
    /// Create the monitor and its log file
    ///
    /// The log is named `performance_<yyyy-MM-dd_HH-mm-ss-mmm>_<pid>.log`
    /// after the creation time and starts with a lifecycle marker. The file
    /// is created exclusively, so no two monitors ever share one.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.log_dir)?;

        let stem = format!(
            "performance_{}_{}",
            Local::now().format("%Y-%m-%d_%H-%M-%S-%3f"),
            std::process::id()
        );
        let path = claim_log_file(&config.log_dir, &stem)?;
        let writer = LogWriter::spawn(path, config.queue_capacity)?;
        writer.append(STARTED_MARKER);

        Ok(Self {
            timers: Mutex::new(HashMap::with_hasher(RandomState::new())),
            writer,
            slow_threshold: Duration::from_millis(config.slow_threshold_ms),
        })
    }

    /// Start timing `name` and return the id that ends it
    pub fn start(&self, name: &str) -> OperationId {
        let id = OperationId::generate(name);
        self.timers.lock().insert(
            id.clone(),
            Timer {
                name: name.to_string(),
                started: Instant::now(),
            },
        );
        id
    }

    /// End the measurement for `id` and log it
    ///
    /// Returns the measured duration, or `None` if `id` is not live.
    pub fn end(&self, id: &OperationId) -> Option<Duration> {
        let timer = self.timers.lock().remove(id)?;
        let elapsed = timer.started.elapsed();
        self.record(&timer.name, elapsed);
        Some(elapsed)
    }

    /// Start a measurement that ends when the returned guard is dropped
    pub fn begin(&self, name: &str) -> Measurement<'_> {
        Measurement {
            monitor: self,
            id: Some(self.start(name)),
        }
    }

    /// Time a synchronous block. The block's result is returned untouched.
    pub fn measure<T, F>(&self, name: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _measurement = self.begin(name);
        f()
    }

    /// Time a future. The future's output is returned untouched.
    pub async fn measure_async<F>(&self, name: &str, fut: F) -> F::Output
    where
        F: Future,
    {
        let _measurement = self.begin(name);
        fut.await
    }

    /// Delete the log file and start a fresh one with a cleared marker
    pub fn clear_logs(&self) -> Result<()> {
        self.writer.clear()
    }

    /// Wait for every queued line to reach the log file
    pub async fn flush(&self) -> Result<()> {
        self.writer.flush().await
    }

    /// Location of the current log file
    pub fn log_file(&self) -> &Path {
        self.writer.path()
    }

    /// Number of measurements currently open
    pub fn live_timers(&self) -> usize {
        self.timers.lock().len()
    }

    /// Lines dropped because the write queue was full
    pub fn dropped_lines(&self) -> u64 {
        self.writer.dropped()
    }

    /// Slow-operation threshold
    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    fn record(&self, name: &str, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;

        let completed = format!("Completed {} in {:.2}ms", name, ms);
        debug!("{}", completed);
        self.writer.append(&completed);

        if elapsed > self.slow_threshold {
            let slow = format!("⚠ Slow operation detected: {} took {:.2}ms", name, ms);
            warn!("{}", slow);
            self.writer.append(&slow);
        }
    }
}

/// Guard for one live measurement
///
/// Dropping the guard ends the measurement, so early returns, `?` and
/// panics inside the timed code are all recorded.
pub struct Measurement<'a> {
    monitor: &'a PerformanceMonitor,
    id: Option<OperationId>,
}

impl Measurement<'_> {
    /// Correlation id of this measurement
    pub fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    /// End the measurement now and return its duration
    pub fn finish(mut self) -> Option<Duration> {
        self.id.take().and_then(|id| self.monitor.end(&id))
    }
}

impl Drop for Measurement<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.monitor.end(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::panic::{self, AssertUnwindSafe};
    use tempfile::TempDir;

    fn monitor(dir: &TempDir) -> PerformanceMonitor {
        PerformanceMonitor::new(MonitorConfig::with_log_dir(dir.path())).unwrap()
    }

    async fn log_lines(monitor: &PerformanceMonitor) -> Vec<String> {
        monitor.flush().await.unwrap();
        fs::read_to_string(monitor.log_file())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn count(lines: &[String], needle: &str) -> usize {
        lines.iter().filter(|l| l.contains(needle)).count()
    }

    #[tokio::test]
    async fn test_log_file_created_with_marker() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir);

        let name = monitor.log_file().file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("performance_"));
        assert!(name.ends_with(".log"));

        let lines = log_lines(&monitor).await;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(STARTED_MARKER));
    }

    #[tokio::test]
    async fn test_measure_logs_completion() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir);

        let value = monitor.measure("decode", || 42);
        assert_eq!(value, 42);
        assert_eq!(monitor.live_timers(), 0);

        let lines = log_lines(&monitor).await;
        assert_eq!(count(&lines, "Completed decode in "), 1);
        assert_eq!(count(&lines, "Slow operation"), 0);
        assert!(lines[1].ends_with("ms"));
    }

    #[tokio::test]
    async fn test_measure_passes_errors_through() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir);

        let result: std::result::Result<u32, String> =
            monitor.measure("fails", || Err("no image".to_string()));
        assert_eq!(result, Err("no image".to_string()));
        assert_eq!(monitor.live_timers(), 0);

        let lines = log_lines(&monitor).await;
        assert_eq!(count(&lines, "Completed fails in "), 1);
    }

    #[tokio::test]
    async fn test_measure_survives_panic() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            monitor.measure("explode", || panic!("boom"))
        }));
        assert!(outcome.is_err());
        assert_eq!(monitor.live_timers(), 0);

        let lines = log_lines(&monitor).await;
        assert_eq!(count(&lines, "Completed explode in "), 1);
    }

    #[tokio::test]
    async fn test_slow_operation_flagged() {
        let dir = TempDir::new().unwrap();
        let config = MonitorConfig {
            slow_threshold_ms: 5,
            ..MonitorConfig::with_log_dir(dir.path())
        };
        let monitor = PerformanceMonitor::new(config).unwrap();

        monitor.measure("sleepy", || std::thread::sleep(Duration::from_millis(20)));

        let lines = log_lines(&monitor).await;
        assert_eq!(count(&lines, "Completed sleepy in "), 1);
        assert_eq!(count(&lines, "⚠ Slow operation detected: sleepy took "), 1);
    }

    #[tokio::test]
    async fn test_measure_async() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir);

        let value = monitor
            .measure_async("fetch", async {
                tokio::task::yield_now().await;
                "pixels"
            })
            .await;
        assert_eq!(value, "pixels");
        assert_eq!(monitor.live_timers(), 0);

        let lines = log_lines(&monitor).await;
        assert_eq!(count(&lines, "Completed fetch in "), 1);
    }

    #[tokio::test]
    async fn test_overlapping_same_name() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir);

        let first = monitor.start("load");
        let second = monitor.start("load");
        assert_ne!(first, second);
        assert_eq!(monitor.live_timers(), 2);

        assert!(monitor.end(&second).is_some());
        assert_eq!(monitor.live_timers(), 1);
        assert!(monitor.end(&first).is_some());
        assert_eq!(monitor.live_timers(), 0);

        // Already ended
        assert!(monitor.end(&first).is_none());

        let lines = log_lines(&monitor).await;
        assert_eq!(count(&lines, "Completed load in "), 2);
    }

    #[tokio::test]
    async fn test_measurement_finish() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir);

        let measurement = monitor.begin("scroll");
        assert!(measurement.id().unwrap().as_str().starts_with("scroll-"));
        assert!(measurement.finish().is_some());
        assert_eq!(monitor.live_timers(), 0);

        let lines = log_lines(&monitor).await;
        assert_eq!(count(&lines, "Completed scroll in "), 1);
    }

    #[tokio::test]
    async fn test_clear_logs() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir);

        monitor.measure("before", || ());
        monitor.clear_logs().unwrap();
        monitor.measure("after", || ());

        let lines = log_lines(&monitor).await;
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("=== Log Cleared ==="));
        assert!(lines[1].contains("Completed after in "));
    }

    #[tokio::test]
    async fn test_clear_during_live_measurement() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir);

        let measurement = monitor.begin("spanning");
        monitor.clear_logs().unwrap();
        drop(measurement);
        assert_eq!(monitor.live_timers(), 0);

        let lines = log_lines(&monitor).await;
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("=== Log Cleared ==="));
        assert!(lines[1].contains("Completed spanning in "));
    }

    #[tokio::test]
    async fn test_monitors_in_same_dir_use_separate_files() {
        let dir = TempDir::new().unwrap();
        let a = monitor(&dir);
        let b = monitor(&dir);
        assert_ne!(a.log_file(), b.log_file());

        a.measure("from_a", || ());
        b.clear_logs().unwrap();
        b.measure("from_b", || ());

        let a_lines = log_lines(&a).await;
        let b_lines = log_lines(&b).await;
        assert!(a_lines[0].ends_with(STARTED_MARKER));
        assert_eq!(count(&a_lines, "Completed from_a in "), 1);
        assert_eq!(count(&a_lines, "from_b"), 0);
        assert!(b_lines[0].ends_with("=== Log Cleared ==="));
        assert_eq!(count(&b_lines, "from_a"), 0);
    }

    #[tokio::test]
    async fn test_burst_on_tiny_queue_accounts_for_every_line() {
        let dir = TempDir::new().unwrap();
        let config = MonitorConfig {
            queue_capacity: 1,
            ..MonitorConfig::with_log_dir(dir.path())
        };
        let monitor = PerformanceMonitor::new(config).unwrap();

        let burst = 200;
        for i in 0..burst {
            assert_eq!(monitor.measure("burst", || i), i);
        }
        assert_eq!(monitor.live_timers(), 0);

        let lines = log_lines(&monitor).await;
        for line in &lines {
            assert!(line.starts_with('['), "malformed line {:?}", line);
            assert_eq!(&line[24..25], "]", "malformed line {:?}", line);
        }
        // Start marker plus one completion line per measurement
        assert_eq!(lines.len() as u64 + monitor.dropped_lines(), 1 + burst as u64);
    }

    #[test]
    fn test_invalid_config() {
        let dir = TempDir::new().unwrap();
        let config = MonitorConfig {
            queue_capacity: 0,
            ..MonitorConfig::with_log_dir(dir.path())
        };

        assert!(matches!(
            PerformanceMonitor::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
