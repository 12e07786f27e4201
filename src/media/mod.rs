//! Media types for the casting pipeline
//!
//! This module provides:
//! - Raw frame and pixel format types
//! - Encoded packet and stream descriptor types
//! - The quantize/blit capability seam with its CPU fallback

pub mod blit;
pub mod frame;
pub mod packet;

pub use blit::{CpuBlitter, QuantizeBlit};
pub use frame::{Frame, PixelFormat};
pub use packet::{EncodedPacket, StreamDescriptor};
