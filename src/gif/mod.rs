//! GIF encoding
//!
//! This module provides:
//! - Palette computation and frame indexing (the quantization core)
//! - LZW image-data encoding with an uncompressed fallback
//! - GIF container serialization and the [`GifSink`] stream sink

pub mod lzw;
pub mod palette;
pub mod writer;

pub use palette::{IndexedFrame, Palette, PaletteEngine, MAX_PALETTE_COLORS, TRANSPARENT_INDEX};
pub use writer::{serialize_image, GifSink};
