//! LoadCoordinator: cache-first, deduplicated image loading
//!
//! A miss on a key with no fetch outstanding makes the caller the leader:
//! it registers an in-flight entry and spawns the fetch. Callers that miss
//! while the entry exists subscribe to it instead. The fetch runs on its own
//! task, so a caller dropping its `load` future never cancels work other
//! callers are waiting on.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::Mutex;
use pixmon::PerformanceMonitor;
use tokio::sync::watch;
use tracing::debug;

use crate::cache::ImageCache;
use crate::image::{DecodedImage, ImageHandle};
use crate::key::{CacheKey, TargetSize};
use crate::pressure::{PressureSource, PressureSubscription};
use crate::stats::LoadStats;

/// `None` until the fetch finishes, then the shared outcome
type FlightReceiver = watch::Receiver<Option<Option<ImageHandle>>>;

type InFlightTable = Mutex<HashMap<CacheKey, FlightReceiver, RandomState>>;

enum Flight {
    Ready(ImageHandle),
    Pending(FlightReceiver),
}

/// Removes the in-flight entry when the fetch task ends, panics included
struct InFlightEntry {
    table: Arc<InFlightTable>,
    key: CacheKey,
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        self.table.lock().remove(&self.key);
    }
}

/// Serves image loads from the cache, coalescing concurrent misses into one fetch
pub struct LoadCoordinator {
    cache: Arc<ImageCache>,
    monitor: Arc<PerformanceMonitor>,
    in_flight: Arc<InFlightTable>,
    stats: Arc<LoadStats>,
    // Held only so dropping the coordinator unsubscribes
    _pressure: Option<PressureSubscription>,
}

impl LoadCoordinator {
    /// Create a coordinator over a shared cache and monitor
    pub fn new(cache: Arc<ImageCache>, monitor: Arc<PerformanceMonitor>) -> Self {
        Self {
            cache,
            monitor,
            in_flight: Arc::new(Mutex::new(HashMap::with_hasher(RandomState::new()))),
            stats: Arc::new(LoadStats::default()),
            _pressure: None,
        }
    }

    /// Clear the cache whenever `source` signals memory pressure
    ///
    /// The subscription lives as long as the coordinator.
    pub fn with_pressure_source(mut self, source: Arc<dyn PressureSource>) -> Self {
        let cache = Arc::clone(&self.cache);
        self._pressure = Some(PressureSubscription::new(
            source,
            Arc::new(move || cache.clear()),
        ));
        self
    }

    /// Load the image for `key`
    ///
    /// Cache hits return immediately. On a miss, `fetch` is called with the
    /// asset id and target size only if no fetch for `key` is already
    /// running; otherwise this call waits for that fetch. Every waiter of
    /// one fetch sees the same outcome. `None` means the fetch produced no
    /// image; nothing is retried.
    pub async fn load<F, Fut>(&self, key: CacheKey, fetch: F) -> Option<ImageHandle>
    where
        F: FnOnce(String, TargetSize) -> Fut + Send,
        Fut: Future<Output = Option<DecodedImage>> + Send + 'static,
    {
        match self.begin(key, fetch) {
            Flight::Ready(image) => Some(image),
            Flight::Pending(rx) => wait(rx).await,
        }
    }

    /// Start (or join) the fetch for `key` without waiting for it
    ///
    /// Must be called from within a Tokio runtime.
    pub fn prefetch<F, Fut>(&self, key: CacheKey, fetch: F)
    where
        F: FnOnce(String, TargetSize) -> Fut,
        Fut: Future<Output = Option<DecodedImage>> + Send + 'static,
    {
        self.begin(key, fetch);
    }

    /// Shared cache
    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    /// Shared monitor
    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    /// Load counters
    pub fn load_stats(&self) -> &LoadStats {
        &self.stats
    }

    /// Number of fetches currently outstanding
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn begin<F, Fut>(&self, key: CacheKey, fetch: F) -> Flight
    where
        F: FnOnce(String, TargetSize) -> Fut,
        Fut: Future<Output = Option<DecodedImage>> + Send + 'static,
    {
        if let Some(image) = self.cache.get(&key) {
            self.stats.record_cache_hit();
            return Flight::Ready(image);
        }

        let (tx, rx) = {
            let mut table = self.in_flight.lock();
            if let Some(rx) = table.get(&key) {
                self.stats.record_joined();
                return Flight::Pending(rx.clone());
            }

            // A fetch may have finished between the miss above and taking the lock
            if let Some(image) = self.cache.peek(&key) {
                self.stats.record_cache_hit();
                return Flight::Ready(image);
            }

            let (tx, rx) = watch::channel(None);
            table.insert(key.clone(), rx.clone());
            (tx, rx)
        };

        let entry = InFlightEntry {
            table: Arc::clone(&self.in_flight),
            key,
        };
        self.stats.record_fetch();
        let fut = fetch(entry.key.asset_id().to_string(), entry.key.size());

        let cache = Arc::clone(&self.cache);
        let monitor = Arc::clone(&self.monitor);
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            let name = format!("load {}", entry.key);
            let outcome = monitor.measure_async(&name, fut).await.map(Arc::new);

            match &outcome {
                Some(image) => cache.put(entry.key.clone(), Arc::clone(image)),
                None => {
                    stats.record_failure();
                    debug!("Fetch for {} produced no image", entry.key);
                }
            }

            // Unregister before publishing so late callers hit the cache instead
            drop(entry);
            tx.send_replace(Some(outcome));
        });

        Flight::Pending(rx)
    }
}

async fn wait(mut rx: FlightReceiver) -> Option<ImageHandle> {
    let outcome = match rx.wait_for(Option::is_some).await {
        Ok(outcome) => (*outcome).clone(),
        // Fetch task died without publishing
        Err(_) => None,
    };
    outcome.flatten()
}
