//! # pixcache
//!
//! In-memory image cache and load coordinator for scrolling UIs.
//!
//! ## Architecture
//! - **ImageCache**: AHash map plus intrusive LRU list, bounded by entry count and total cost
//! - **LoadCoordinator**: cache-first loads with at most one outstanding fetch per key
//! - **Pressure**: host memory warnings clear the cache synchronously
//!
//! Fetches are timed through [`pixmon::PerformanceMonitor`]; cache hits are
//! only counted.

#![warn(missing_docs)]

mod cache;
mod coordinator;
mod error;
mod image;
mod key;
mod lru;
mod pressure;
mod stats;

pub use cache::{CacheLimits, ImageCache, DEFAULT_MAX_COST, DEFAULT_MAX_COUNT};
pub use coordinator::LoadCoordinator;
pub use error::{Error, Result};
pub use image::{DecodedImage, ImageHandle};
pub use key::{CacheKey, TargetSize};
pub use pressure::{
    PressureHandler, PressureNotifier, PressureSource, PressureSubscription, SubscriptionId,
};
pub use stats::{CacheSnapshot, CacheStats, LoadStats};
