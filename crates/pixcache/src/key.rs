//! Cache addressing

use std::fmt;
use std::sync::Arc;

/// Requested pixel dimensions of a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl TargetSize {
    /// Create a size descriptor
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Asset identifier plus target size
///
/// The same asset at two sizes is two distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    asset_id: Arc<str>,
    size: TargetSize,
}

impl CacheKey {
    /// Create a key for `asset_id` rendered at `size`
    pub fn new(asset_id: impl Into<Arc<str>>, size: TargetSize) -> Self {
        Self {
            asset_id: asset_id.into(),
            size,
        }
    }

    /// Opaque asset identifier
    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    /// Target size
    pub fn size(&self) -> TargetSize {
        self.size
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.asset_id, self.size)
    }
}
