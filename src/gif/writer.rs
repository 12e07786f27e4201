//! GIF container serialization
//!
//! Frame payloads are serialized by the encoder worker with
//! [`serialize_image`]; the [`GifSink`] wraps them in the container
//! scaffolding:
//!
//! ```text
//! "GIF89a" | Logical Screen Descriptor | NETSCAPE loop ext
//!     | (GCE | Image Descriptor | Color Table | LZW data)*  | 0x3B
//! ```
//!
//! GIF has no palette inheritance without a global color table, so every
//! frame carries a local color table; for delta frames it repeats the
//! previous palette's bytes (the palette itself is only regenerated on
//! keyframes).
//!
//! After every sample the sink flushes the complete file so far to its
//! [`StreamWriter`], so HTTP viewers always receive a valid, growing GIF.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CastError, Result};
use crate::gif::palette::{IndexedFrame, TRANSPARENT_INDEX};
use crate::media::packet::{EncodedPacket, StreamDescriptor};
use crate::muxer::{StreamSink, StreamWriter};

use super::lzw;

/// GIF trailer byte
const TRAILER: u8 = 0x3B;

/// Minimum LZW code size for the 256-entry tables this writer emits
const MIN_CODE_SIZE: u8 = 8;

// ── Frame serialization ──────────────────────────────────────────

/// Serialize one indexed frame into a container-ready image block
///
/// `delay_cs` is the frame delay in centiseconds. Delta frames set the
/// transparency flag on the graphic control extension so unchanged pixels
/// show through; `mark_transparency = false` disables that (the
/// debug-transparency mode, which renders the reserved slot's color
/// instead).
///
/// Fails when either dimension exceeds the image descriptor's 16-bit
/// fields; truncating would desync the index count from the written
/// geometry.
pub fn serialize_image(
    indexed: &IndexedFrame,
    delay_cs: u16,
    use_lzw: bool,
    mark_transparency: bool,
) -> Result<Bytes> {
    if indexed.width > u16::MAX as u32 || indexed.height > u16::MAX as u32 {
        return Err(CastError::InvalidInput("frame dimensions exceed gif limits"));
    }

    let mut buf = BytesMut::new();

    // Graphic control extension. Disposal 1 (leave in place) so delta
    // frames composite over the previous image.
    let transparent = !indexed.keyframe && mark_transparency;
    let mut packed: u8 = 1 << 2;
    if transparent {
        packed |= 0x01;
    }
    buf.put_u8(0x21);
    buf.put_u8(0xF9);
    buf.put_u8(0x04);
    buf.put_u8(packed);
    buf.put_u16_le(delay_cs);
    buf.put_u8(TRANSPARENT_INDEX);
    buf.put_u8(0x00);

    // Image descriptor with a 256-entry local color table.
    buf.put_u8(0x2C);
    buf.put_u16_le(0); // left
    buf.put_u16_le(0); // top
    buf.put_u16_le(indexed.width as u16);
    buf.put_u16_le(indexed.height as u16);
    buf.put_u8(0x80 | (MIN_CODE_SIZE - 1)); // local table, 2^8 entries

    // Color table, padded to 256 entries.
    for slot in 0..256usize {
        let color = if slot < indexed.palette.color_count() {
            indexed.palette.color(slot as u8)
        } else {
            [0, 0, 0]
        };
        buf.put_slice(&color);
    }

    buf.put_slice(&lzw::encode_image_data(
        &indexed.indices,
        MIN_CODE_SIZE,
        use_lzw,
    ));

    Ok(buf.freeze())
}

// ── GifSink ──────────────────────────────────────────────────────

/// [`StreamSink`] writing an animated GIF
///
/// GIF holds a single image stream; declaring a second input stream fails
/// stream setup (the muxer logs and skips it).
pub struct GifSink {
    writer: Box<dyn StreamWriter>,
    file: Vec<u8>,
    descriptor: Option<StreamDescriptor>,
    /// NETSCAPE loop count; 0 loops forever
    loop_count: u16,
}

impl GifSink {
    /// Create a sink flushing to `writer`
    pub fn new(writer: Box<dyn StreamWriter>) -> Self {
        Self {
            writer,
            file: Vec::new(),
            descriptor: None,
            loop_count: 0,
        }
    }

    fn flush(&mut self) {
        self.writer.write(&self.file);
    }
}

impl StreamSink for GifSink {
    fn add_stream(&mut self, descriptor: &StreamDescriptor) -> Result<usize> {
        if self.descriptor.is_some() {
            return Err(CastError::Sink(
                "gif container supports a single stream".to_string(),
            ));
        }
        if descriptor.width == 0 || descriptor.height == 0 || descriptor.width > u16::MAX as u32
            || descriptor.height > u16::MAX as u32
        {
            return Err(CastError::Sink(format!(
                "unsupported gif dimensions {}x{}",
                descriptor.width, descriptor.height
            )));
        }
        self.descriptor = Some(descriptor.clone());
        Ok(0)
    }

    fn set_input_format(&mut self, output_index: usize, descriptor: &StreamDescriptor) -> Result<()> {
        if output_index != 0 || self.descriptor.is_none() {
            return Err(CastError::Sink("unknown gif output stream".to_string()));
        }
        self.descriptor = Some(descriptor.clone());
        Ok(())
    }

    fn begin_writing(&mut self) -> Result<()> {
        let descriptor = self
            .descriptor
            .clone()
            .ok_or_else(|| CastError::Sink("begin_writing before stream setup".to_string()))?;

        let mut buf = BytesMut::new();
        buf.put_slice(b"GIF89a");

        // Logical screen descriptor, no global color table.
        buf.put_u16_le(descriptor.width as u16);
        buf.put_u16_le(descriptor.height as u16);
        buf.put_u8(0x70); // color resolution 8 bits
        buf.put_u8(0x00); // background color index
        buf.put_u8(0x00); // pixel aspect ratio

        // NETSCAPE 2.0 looping extension.
        buf.put_u8(0x21);
        buf.put_u8(0xFF);
        buf.put_u8(0x0B);
        buf.put_slice(b"NETSCAPE2.0");
        buf.put_u8(0x03);
        buf.put_u8(0x01);
        buf.put_u16_le(self.loop_count);
        buf.put_u8(0x00);

        self.file.extend_from_slice(&buf);
        self.flush();
        Ok(())
    }

    fn write_sample(&mut self, output_index: usize, packet: &EncodedPacket) -> Result<()> {
        if output_index != 0 {
            return Err(CastError::Sink("unknown gif output stream".to_string()));
        }
        self.file.extend_from_slice(&packet.data);
        self.flush();
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.file.push(TRAILER);
        self.flush();
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
