//! Decoded image values handed out by the cache

use std::sync::Arc;

use bytes::Bytes;

/// Shared read-only handle to a decoded image
///
/// Evicting an entry only drops the cache's reference; handles held by
/// callers stay valid.
pub type ImageHandle = Arc<DecodedImage>;

/// Decoded pixel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    bytes_per_pixel: u8,
    pixels: Bytes,
}

impl DecodedImage {
    /// Wrap a pixel buffer
    pub fn new(width: u32, height: u32, bytes_per_pixel: u8, pixels: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
            pixels: pixels.into(),
        }
    }

    /// Solid-filled RGBA image
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }
        Self::new(width, height, 4, pixels)
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per pixel (channel count times channel depth)
    pub fn bytes_per_pixel(&self) -> u8 {
        self.bytes_per_pixel
    }

    /// Raw pixel data
    pub fn pixels(&self) -> &Bytes {
        &self.pixels
    }

    /// Eviction weight: pixel count times bytes per pixel, saturating at
    /// `usize::MAX`
    pub fn cost(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(self.bytes_per_pixel as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost() {
        let image = DecodedImage::filled(10, 20, [255, 0, 0, 255]);

        assert_eq!(image.cost(), 800);
        assert_eq!(image.pixels().len(), 800);
    }

    #[test]
    fn test_cost_ignores_buffer_length() {
        let image = DecodedImage::new(4, 4, 3, Vec::new());
        assert_eq!(image.cost(), 48);
    }

    #[test]
    fn test_cost_saturates() {
        let image = DecodedImage::new(u32::MAX, u32::MAX, 255, Vec::new());
        assert_eq!(image.cost(), usize::MAX);
    }
}
