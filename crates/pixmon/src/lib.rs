//! # pixmon
//!
//! Performance instrumentation for the pix image pipeline.
//!
//! ## Architecture
//! - **Timers**: correlation-id keyed start timestamps on a monotonic clock
//! - **Slow operations**: anything over the threshold (100 ms by default) gets a warning line
//! - **Log**: one append-only text file per run, written by a background thread
//!
//! Log lines look like `[2024-05-01 12:00:00.123] Completed load in 12.34ms`.

#![warn(missing_docs)]

mod error;
mod monitor;
mod writer;

pub use error::{Error, Result};
pub use monitor::{
    Measurement, MonitorConfig, OperationId, PerformanceMonitor, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SLOW_THRESHOLD_MS,
};
