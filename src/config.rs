//! Caster configuration
//!
//! The host passes configuration as a bit-flag word (stable across language
//! boundaries); [`CastFlags`] decodes it and [`EncoderParams`] is the derived
//! parameter set consumed by the palette engine and encoder worker.

use bitflags::bitflags;

/// Default HTTP port when an address omits one
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default endpoint path when an address omits one
pub const DEFAULT_HTTP_PATH: &str = "/";

bitflags! {
    /// Host-facing configuration bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CastFlags: u32 {
        /// Serve the finalized file after `finish` (rather than dropping it)
        const SHOW_FINISHED_FILE  = 1 << 0;
        /// Permit delta frames that reuse the previous palette and mark
        /// unchanged pixels transparent
        const ALLOW_INTRA_FRAMES  = 1 << 1;
        /// Emit a visualizable palette swatch instead of the indexed image
        const DEBUG_PALETTE       = 1 << 2;
        /// Render the index map as grayscale output
        const DEBUG_INDEXES       = 1 << 3;
        /// Highlight transparent (unchanged) pixels
        const DEBUG_TRANSPARENCY  = 1 << 4;
        /// Encoder worker drains its queue to the newest pending frame
        const SKIP_FRAMES         = 1 << 5;
        /// Never use a GPU quantize/blit backend
        const CPU_ONLY            = 1 << 6;
        /// LZW-compress image data (uncompressed GIF codes otherwise)
        const LZW_COMPRESSION     = 1 << 7;
    }
}

/// Parameters for one casting instance
#[derive(Debug, Clone)]
pub struct CasterParams {
    /// Output target: `"port/path"` as accepted by [`crate::http::parse_address`]
    pub address: String,
    /// Configuration bits
    pub flags: CastFlags,
}

impl CasterParams {
    /// Create params for the given address with default flags
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            flags: CastFlags::ALLOW_INTRA_FRAMES | CastFlags::LZW_COMPRESSION,
        }
    }

    /// Set the configuration bits
    pub fn flags(mut self, flags: CastFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Derived per-stream encoder parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderParams {
    /// Permit intra (delta) frames with transparency shortcuts
    pub allow_intra_frames: bool,
    /// Reuse the previous palette unconditionally, skipping regeneration
    pub force_prev_palette: bool,
    /// Emit a palette swatch image
    pub make_debug_palette: bool,
    /// Render indices as grayscale
    pub debug_indexes: bool,
    /// Highlight transparent pixels
    pub debug_transparency: bool,
    /// Drain the pending queue to the newest frame each iteration
    pub skip_frames: bool,
    /// Never use a GPU quantize/blit backend
    pub cpu_only: bool,
    /// LZW-compress image data
    pub lzw_compression: bool,
}

impl From<CastFlags> for EncoderParams {
    fn from(flags: CastFlags) -> Self {
        Self {
            allow_intra_frames: flags.contains(CastFlags::ALLOW_INTRA_FRAMES),
            force_prev_palette: false,
            make_debug_palette: flags.contains(CastFlags::DEBUG_PALETTE),
            debug_indexes: flags.contains(CastFlags::DEBUG_INDEXES),
            debug_transparency: flags.contains(CastFlags::DEBUG_TRANSPARENCY),
            skip_frames: flags.contains(CastFlags::SKIP_FRAMES),
            cpu_only: flags.contains(CastFlags::CPU_ONLY),
            lzw_compression: flags.contains(CastFlags::LZW_COMPRESSION),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip_bits() {
        let flags = CastFlags::from_bits_truncate(0b1010_0010);
        assert!(flags.contains(CastFlags::ALLOW_INTRA_FRAMES));
        assert!(flags.contains(CastFlags::SKIP_FRAMES));
        assert!(flags.contains(CastFlags::LZW_COMPRESSION));
        assert!(!flags.contains(CastFlags::CPU_ONLY));
    }

    #[test]
    fn encoder_params_from_flags() {
        let params: EncoderParams =
            (CastFlags::ALLOW_INTRA_FRAMES | CastFlags::CPU_ONLY).into();
        assert!(params.allow_intra_frames);
        assert!(params.cpu_only);
        assert!(!params.lzw_compression);
        assert!(!params.force_prev_palette);
    }
}
