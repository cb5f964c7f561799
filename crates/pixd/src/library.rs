//! Synthetic photo library standing in for the platform decoder

use pixcache::{DecodedImage, TargetSize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Fake asset store that "decodes" solid-colour thumbnails after a delay
pub struct SyntheticLibrary {
    latency: Duration,
    fail_every: usize,
    decodes: AtomicU64,
}

impl SyntheticLibrary {
    pub fn new(latency: Duration, fail_every: usize) -> Self {
        Self {
            latency,
            fail_every,
            decodes: AtomicU64::new(0),
        }
    }

    /// Identifier of the asset at `index`
    pub fn asset_id(index: usize) -> String {
        format!("IMG_{:05}", index)
    }

    /// Decode `asset_id` at `size`; `None` for unknown or failing assets
    pub async fn fetch(self: Arc<Self>, asset_id: String, size: TargetSize) -> Option<DecodedImage> {
        self.decodes.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;

        let index: usize = asset_id.strip_prefix("IMG_")?.parse().ok()?;
        if self.fail_every > 0 && (index + 1) % self.fail_every == 0 {
            debug!("Decode failed for {}", asset_id);
            return None;
        }

        let shade = (index % 256) as u8;
        Some(DecodedImage::filled(
            size.width,
            size.height,
            [shade, shade.wrapping_mul(3), shade.wrapping_mul(7), 255],
        ))
    }

    /// Decodes performed so far
    pub fn decodes(&self) -> u64 {
        self.decodes.load(Ordering::Relaxed)
    }
}
