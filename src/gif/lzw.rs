//! GIF image-data encoding (LZW)
//!
//! GIF image data is a stream of variable-width LZW codes, packed LSB-first
//! and chopped into sub-blocks of at most 255 bytes. Two modes are
//! supported:
//!
//! - **Compressed**: real LZW with a growing dictionary (reset via a clear
//!   code at 4095 entries).
//! - **Uncompressed**: every pixel emitted as a literal code, with clear
//!   codes interleaved often enough that the decoder's code width never
//!   grows. Larger output, much cheaper to produce.
//!
//! ```text
//! +---------------+------------------------------+------+
//! | MinCodeSize(1)| sub-blocks: len(1) + data(n) | 0x00 |
//! +---------------+------------------------------+------+
//! ```

use std::collections::HashMap;

/// Maximum LZW code value before the dictionary must reset
const MAX_CODE: u16 = 4095;

// ── Bit packing ──────────────────────────────────────────────────

/// LSB-first bit packer emitting 255-byte GIF sub-blocks
struct BitWriter {
    out: Vec<u8>,
    /// Start of the current sub-block's length byte
    block_start: usize,
    acc: u32,
    acc_bits: u8,
}

impl BitWriter {
    fn new(min_code_size: u8) -> Self {
        let mut out = Vec::new();
        out.push(min_code_size);
        let block_start = out.len();
        out.push(0); // current sub-block length, patched as bytes land
        Self {
            out,
            block_start,
            acc: 0,
            acc_bits: 0,
        }
    }

    fn write_code(&mut self, code: u16, width: u8) {
        self.acc |= (code as u32) << self.acc_bits;
        self.acc_bits += width;
        while self.acc_bits >= 8 {
            self.push_byte((self.acc & 0xFF) as u8);
            self.acc >>= 8;
            self.acc_bits -= 8;
        }
    }

    fn push_byte(&mut self, byte: u8) {
        if self.out[self.block_start] == 255 {
            self.block_start = self.out.len();
            self.out.push(0);
        }
        self.out.push(byte);
        self.out[self.block_start] += 1;
    }

    fn finish(mut self) -> Vec<u8> {
        if self.acc_bits > 0 {
            self.push_byte((self.acc & 0xFF) as u8);
        }
        if self.out[self.block_start] == 0 {
            // Empty trailing sub-block doubles as the terminator only if we
            // drop it first.
            self.out.pop();
        }
        self.out.push(0); // block terminator
        self.out
    }
}

// ── Encoders ─────────────────────────────────────────────────────

/// Encode an index stream as GIF image data
///
/// `min_code_size` is the GIF minimum code size for the color table in use
/// (8 for a 256-entry table, never below 2).
pub fn encode_image_data(indices: &[u8], min_code_size: u8, compress: bool) -> Vec<u8> {
    if compress {
        encode_lzw(indices, min_code_size)
    } else {
        encode_uncompressed(indices, min_code_size)
    }
}

fn encode_lzw(indices: &[u8], min_code_size: u8) -> Vec<u8> {
    let clear: u16 = 1 << min_code_size;
    let eoi: u16 = clear + 1;

    let mut writer = BitWriter::new(min_code_size);
    let mut dict: HashMap<(u16, u8), u16> = HashMap::new();
    let mut next_code: u16 = eoi + 1;
    let mut width: u8 = min_code_size + 1;

    writer.write_code(clear, width);

    let mut iter = indices.iter();
    let Some(&first) = iter.next() else {
        writer.write_code(eoi, width);
        return writer.finish();
    };
    let mut prefix: u16 = first as u16;

    for &k in iter {
        if let Some(&code) = dict.get(&(prefix, k)) {
            prefix = code;
            continue;
        }

        writer.write_code(prefix, width);
        dict.insert((prefix, k), next_code);

        // The decoder adds its mirror entry after reading this code; grow
        // our width in lockstep.
        if next_code == (1 << width) && width < 12 {
            width += 1;
        }
        next_code += 1;

        if next_code > MAX_CODE {
            writer.write_code(clear, width);
            dict.clear();
            next_code = eoi + 1;
            width = min_code_size + 1;
        }

        prefix = k as u16;
    }

    writer.write_code(prefix, width);
    writer.write_code(eoi, width);
    writer.finish()
}

fn encode_uncompressed(indices: &[u8], min_code_size: u8) -> Vec<u8> {
    let clear: u16 = 1 << min_code_size;
    let eoi: u16 = clear + 1;
    let width: u8 = min_code_size + 1;
    // Literals the decoder can absorb after a clear before its code width
    // would grow past `width`.
    let reset_interval: u32 = (1 << min_code_size) - 2;

    let mut writer = BitWriter::new(min_code_size);
    writer.write_code(clear, width);

    let mut since_clear: u32 = 0;
    for &index in indices {
        writer.write_code(index as u16, width);
        since_clear += 1;
        if since_clear >= reset_interval {
            writer.write_code(clear, width);
            since_clear = 0;
        }
    }

    writer.write_code(eoi, width);
    writer.finish()
}

// ── Tests ────────────────────────────────────────────────────────
