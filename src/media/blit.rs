//! Quantize/blit capability
//!
//! The palette engine maps every source pixel to its nearest palette entry.
//! On platforms with a graphics context that work can run as a shader pass;
//! this module defines the seam. Backends are swappable implementations of
//! [`QuantizeBlit`]; the crate ships the CPU path and always falls back to it
//! when no backend is registered or `CPU_ONLY` is set.

use crate::error::Result;
use crate::gif::palette::Palette;

use super::frame::Frame;

/// Capability to map a source frame onto a palette, producing an index buffer
///
/// Implementations must be deterministic for a fixed input: ties in nearest
/// color distance resolve to the lowest palette index.
pub trait QuantizeBlit: Send + Sync {
    /// Map every pixel of `source` to its nearest entry in `palette`
    ///
    /// Returns one palette index per pixel in row-major order.
    fn blit_and_index(&self, source: &Frame, palette: &Palette) -> Result<Vec<u8>>;
}

/// Pure-CPU nearest-color mapping
#[derive(Debug, Default)]
pub struct CpuBlitter;

impl QuantizeBlit for CpuBlitter {
    fn blit_and_index(&self, source: &Frame, palette: &Palette) -> Result<Vec<u8>> {
        let mut indices = Vec::with_capacity(source.pixel_count());
        for y in 0..source.height {
            for x in 0..source.width {
                let (r, g, b) = source.rgb_at(x, y);
                indices.push(palette.nearest(r, g, b));
            }
        }
        Ok(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::frame::PixelFormat;
    use bytes::Bytes;

    #[test]
    fn index_buffer_matches_source_dimensions() {
        let palette = Palette::from_colors(vec![[0, 0, 0], [255, 255, 255]]);
        let data = Bytes::from(vec![0u8; 3 * 2 * 4]);
        let frame = Frame::new(3, 2, PixelFormat::Rgba8, data, 0, 0).unwrap();

        let indices = CpuBlitter.blit_and_index(&frame, &palette).unwrap();
        assert_eq!(indices.len(), 6);
    }
}
