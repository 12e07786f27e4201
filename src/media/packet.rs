//! Encoded packet and stream descriptor types

use bytes::Bytes;

use super::frame::PixelFormat;

/// A compressed, container-ready payload produced by an encoder worker
///
/// Packets are immutable once created and cheap to clone (`Bytes` is
/// reference-counted). Ordering is implied by arrival order at the muxer;
/// packets carry no explicit sequence number.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    /// Logical input stream this packet belongs to
    pub stream_index: usize,
    /// Presentation timestamp in milliseconds
    pub timestamp_ms: u32,
    /// Whether this packet is fully self-contained
    pub keyframe: bool,
    /// Compressed payload
    pub data: Bytes,
}

impl EncodedPacket {
    /// Create a packet
    pub fn new(stream_index: usize, timestamp_ms: u32, keyframe: bool, data: Bytes) -> Self {
        Self {
            stream_index,
            timestamp_ms,
            keyframe,
            data,
        }
    }
}

/// Negotiated description of one output stream
///
/// Passed to the muxer once per stream before any packet flows. A
/// descriptor's stream index is unique per muxer instance.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    /// Logical input stream index
    pub stream_index: usize,
    /// Nominal frame rate
    pub frames_per_second: u32,
    /// Target bit rate in bits/second (0 = sink default)
    pub bit_rate: u32,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Source pixel layout
    pub format: PixelFormat,
}

impl StreamDescriptor {
    /// Descriptor with nominal defaults for the given geometry
    pub fn new(stream_index: usize, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            stream_index,
            frames_per_second: 30,
            bit_rate: 0,
            width,
            height,
            format,
        }
    }
}

impl std::fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "stream {} {}x{} @{}fps",
            self.stream_index, self.width, self.height, self.frames_per_second
        )
    }
}
