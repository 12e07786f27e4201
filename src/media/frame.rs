//! Raw pixel frame types
//!
//! A [`Frame`] is a full copy of a rendered surface handed off by the capture
//! side. Capture must copy out of GPU-resident storage on the thread that owns
//! the graphics context; from the moment a frame is pushed to a worker it is
//! owned by that worker and immutable.

use bytes::Bytes;

/// Pixel layout of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit RGBA, red first
    Rgba8,
    /// 8-bit BGRA, blue first (typical swapchain readback order)
    Bgra8,
}

impl PixelFormat {
    /// Bytes per pixel for this format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }

    /// Extract (r, g, b) from one pixel's bytes
    pub fn rgb(&self, px: &[u8]) -> (u8, u8, u8) {
        match self {
            PixelFormat::Rgba8 => (px[0], px[1], px[2]),
            PixelFormat::Bgra8 => (px[2], px[1], px[0]),
        }
    }
}

/// A captured raw pixel frame
///
/// Cheap to clone: pixel data is reference-counted via [`Bytes`].
#[derive(Debug, Clone)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout
    pub format: PixelFormat,
    /// Tightly packed pixel data, `width * height * bpp` bytes
    pub data: Bytes,
    /// Capture timestamp in milliseconds, relative to the instance base time
    pub timestamp_ms: u32,
    /// Logical stream this frame belongs to
    pub stream_index: usize,
}

impl Frame {
    /// Create a frame, validating dimensions against the payload length
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Bytes,
        timestamp_ms: u32,
        stream_index: usize,
    ) -> crate::error::Result<Self> {
        if width == 0 || height == 0 {
            return Err(crate::error::CastError::InvalidInput("zero-sized frame"));
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(crate::error::CastError::InvalidInput(
                "frame data length does not match dimensions",
            ));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
            timestamp_ms,
            stream_index,
        })
    }

    /// Number of pixels in the frame
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// The pixel at (x, y) as an (r, g, b) triple
    pub fn rgb_at(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let bpp = self.format.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        self.format.rgb(&self.data[offset..offset + bpp])
    }
}
