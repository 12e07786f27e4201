//! Palette computation and frame indexing
//!
//! The palette engine is the heart of the encoder: it reduces a full-color
//! RGBA frame to a bounded palette (median-cut quantization), maps every
//! pixel to its nearest palette entry, and decides keyframe vs. delta frame.
//! Delta frames reuse the previous palette and mark pixels whose quantized
//! color is unchanged with the reserved transparency index, so the payload
//! compresses to almost nothing on static content.
//!
//! All of this is deterministic for a fixed input: histogram entries are
//! sorted before splitting, and nearest-color ties resolve to the lowest
//! palette index.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::EncoderParams;
use crate::error::{CastError, Result};
use crate::media::blit::{CpuBlitter, QuantizeBlit};
use crate::media::frame::Frame;

/// Maximum number of real colors in a palette (one slot is reserved)
pub const MAX_PALETTE_COLORS: usize = 255;

/// Reserved palette index marking an unchanged (transparent) pixel
pub const TRANSPARENT_INDEX: u8 = 0;

/// Mean squared per-pixel error above which a reused palette is considered
/// stale and regenerated
const REGEN_ERROR_THRESHOLD: u64 = 512;

// ── Palette ──────────────────────────────────────────────────────

/// An ordered set of up to 255 colors plus the reserved transparency slot
///
/// Index 0 is always the reserved slot; real colors occupy indices `1..`.
/// Colors are sorted by luminance so that palettes built from the same
/// content diff stably.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    /// Build a palette from raw colors
    ///
    /// Sorts by luminance, truncates to [`MAX_PALETTE_COLORS`], and prepends
    /// the reserved transparency slot.
    pub fn from_colors(mut colors: Vec<[u8; 3]>) -> Self {
        colors.sort_by_key(|c| {
            let luma = 2 * c[0] as u32 + 7 * c[1] as u32 + c[2] as u32;
            (luma, c[0], c[1], c[2])
        });
        colors.truncate(MAX_PALETTE_COLORS);

        let mut table = Vec::with_capacity(colors.len() + 1);
        // Reserved slot; rendered only in debug-transparency mode.
        table.push([255, 0, 255]);
        table.extend(colors);
        Self { colors: table }
    }

    /// Total slot count including the reserved slot
    pub fn color_count(&self) -> usize {
        self.colors.len()
    }

    /// The color stored at `index`
    pub fn color(&self, index: u8) -> [u8; 3] {
        self.colors[index as usize]
    }

    /// All slots including the reserved one
    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// Index of the nearest real color to (r, g, b)
    ///
    /// The reserved slot never matches. Ties resolve to the lowest index.
    pub fn nearest(&self, r: u8, g: u8, b: u8) -> u8 {
        let mut best_index = 1u8;
        let mut best_dist = u32::MAX;
        for (i, c) in self.colors.iter().enumerate().skip(1) {
            let dr = c[0] as i32 - r as i32;
            let dg = c[1] as i32 - g as i32;
            let db = c[2] as i32 - b as i32;
            let dist = (dr * dr + dg * dg + db * db) as u32;
            if dist < best_dist {
                best_dist = dist;
                best_index = i as u8;
            }
        }
        best_index
    }

    /// Replace every real color with a grayscale ramp of the same length
    ///
    /// Used by the debug-indexes mode so the index map itself is visible.
    pub fn to_grayscale_ramp(&self) -> Palette {
        let count = self.colors.len().saturating_sub(1).max(1);
        // Bypass from_colors: the ramp order is the point here.
        let mut table = vec![[255u8, 0, 255]];
        table.extend((0..count).map(|i| {
            let v = (i * 255 / count) as u8;
            [v, v, v]
        }));
        Palette { colors: table }
    }
}

// ── IndexedFrame ─────────────────────────────────────────────────

/// A palette-indexed frame produced by the engine
#[derive(Debug, Clone)]
pub struct IndexedFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// One palette index per pixel, row-major
    pub indices: Vec<u8>,
    /// Whether this frame is fully self-contained
    pub keyframe: bool,
    /// The palette the indices refer to
    pub palette: Arc<Palette>,
}

// ── PaletteEngine ────────────────────────────────────────────────

/// Previous-frame context for delta decisions
///
/// `indices` is the resolved index map (before any transparency
/// substitution), so consecutive deltas compare against real colors.
struct PrevFrame {
    palette: Arc<Palette>,
    indices: Vec<u8>,
    width: u32,
    height: u32,
}

/// Stateful palette engine, owned exclusively by one encoder worker
///
/// Remembers the previous palette and indexed frame between calls; the first
/// frame (or the first after [`reset`](Self::reset)) is always a keyframe.
pub struct PaletteEngine {
    params: EncoderParams,
    blitter: Arc<dyn QuantizeBlit>,
    prev: Option<PrevFrame>,
}

impl PaletteEngine {
    /// Create an engine using the CPU quantize/blit path
    pub fn new(params: EncoderParams) -> Self {
        Self::with_blitter(params, Arc::new(CpuBlitter))
    }

    /// Create an engine with an explicit quantize/blit backend
    ///
    /// When `cpu_only` is set the backend is ignored in favor of the CPU
    /// path.
    pub fn with_blitter(params: EncoderParams, blitter: Arc<dyn QuantizeBlit>) -> Self {
        let blitter: Arc<dyn QuantizeBlit> = if params.cpu_only {
            Arc::new(CpuBlitter)
        } else {
            blitter
        };
        Self {
            params,
            blitter,
            prev: None,
        }
    }

    /// Drop the previous-frame context, forcing the next frame to keyframe
    pub fn reset(&mut self) {
        self.prev = None;
    }

    /// Quantize and index one frame
    ///
    /// Fails with `InvalidInput` for zero-sized or truncated frames.
    pub fn encode(&mut self, frame: &Frame) -> Result<IndexedFrame> {
        if frame.width == 0 || frame.height == 0 {
            return Err(CastError::InvalidInput("zero-sized frame"));
        }
        let expected =
            frame.pixel_count() * frame.format.bytes_per_pixel();
        if frame.data.len() < expected {
            return Err(CastError::InvalidInput("truncated frame data"));
        }

        if self.params.make_debug_palette {
            return self.encode_debug_swatch(frame);
        }

        // Decide whether to reuse the previous palette. A palette is just
        // colors, so the forced reuse ignores dimensions entirely; the
        // staleness check stays dimension-gated because a resize usually
        // means new content.
        let dims_match = self
            .prev
            .as_ref()
            .map(|p| p.width == frame.width && p.height == frame.height)
            .unwrap_or(false);

        let (palette, regenerated) = match &self.prev {
            Some(prev) if self.params.force_prev_palette => {
                (Arc::clone(&prev.palette), false)
            }
            Some(prev) if dims_match && !palette_is_stale(frame, &prev.palette) => {
                (Arc::clone(&prev.palette), false)
            }
            _ => {
                let colors = quantize_colors(frame, MAX_PALETTE_COLORS);
                (Arc::new(Palette::from_colors(colors)), true)
            }
        };

        let resolved = self.blitter.blit_and_index(frame, &palette)?;

        // Keyframes carry no transparency shortcuts. A resize forces one
        // even under a reused palette; the previous index map does not
        // line up pixel-for-pixel anymore.
        let keyframe = regenerated || !dims_match || !self.params.allow_intra_frames;

        let mut indices = resolved.clone();
        if !keyframe {
            // Reusing the palette and the previous frame exists by
            // construction: mark unchanged pixels transparent.
            if let Some(prev) = &self.prev {
                for (out, prev_index) in indices.iter_mut().zip(prev.indices.iter()) {
                    if *out == *prev_index {
                        *out = TRANSPARENT_INDEX;
                    }
                }
            }
        }

        let out_palette = if self.params.debug_indexes {
            Arc::new(palette.to_grayscale_ramp())
        } else {
            Arc::clone(&palette)
        };

        self.prev = Some(PrevFrame {
            palette,
            indices: resolved,
            width: frame.width,
            height: frame.height,
        });

        Ok(IndexedFrame {
            width: frame.width,
            height: frame.height,
            indices,
            keyframe,
            palette: out_palette,
        })
    }

    /// Render the computed palette as a swatch grid instead of the image
    fn encode_debug_swatch(&mut self, frame: &Frame) -> Result<IndexedFrame> {
        let colors = quantize_colors(frame, MAX_PALETTE_COLORS);
        let palette = Arc::new(Palette::from_colors(colors));

        let real = (palette.color_count() - 1).max(1);
        let cols = (real as f64).sqrt().ceil() as usize;
        let rows = (real + cols - 1) / cols;
        let cell_w = (frame.width as usize / cols).max(1);
        let cell_h = (frame.height as usize / rows).max(1);

        let mut indices = Vec::with_capacity(frame.pixel_count());
        for y in 0..frame.height as usize {
            for x in 0..frame.width as usize {
                let cell = (y / cell_h).min(rows - 1) * cols + (x / cell_w).min(cols - 1);
                indices.push((1 + cell.min(real - 1)) as u8);
            }
        }

        self.prev = Some(PrevFrame {
            palette: Arc::clone(&palette),
            indices: indices.clone(),
            width: frame.width,
            height: frame.height,
        });

        Ok(IndexedFrame {
            width: frame.width,
            height: frame.height,
            indices,
            keyframe: true,
            palette,
        })
    }
}

// ── Quantization ─────────────────────────────────────────────────

/// Whether `palette` still represents `frame` acceptably
///
/// Samples a fixed pixel stride and compares mean squared nearest-color
/// distance against [`REGEN_ERROR_THRESHOLD`].
fn palette_is_stale(frame: &Frame, palette: &Palette) -> bool {
    let step = (frame.pixel_count() / 1024).max(1);
    let mut total: u64 = 0;
    let mut samples: u64 = 0;

    let mut i = 0;
    while i < frame.pixel_count() {
        let x = (i % frame.width as usize) as u32;
        let y = (i / frame.width as usize) as u32;
        let (r, g, b) = frame.rgb_at(x, y);
        let c = palette.color(palette.nearest(r, g, b));
        let dr = c[0] as i64 - r as i64;
        let dg = c[1] as i64 - g as i64;
        let db = c[2] as i64 - b as i64;
        total += (dr * dr + dg * dg + db * db) as u64;
        samples += 1;
        i += step;
    }

    samples > 0 && total / samples > REGEN_ERROR_THRESHOLD
}

/// Median-cut quantization to at most `max_colors` representative colors
fn quantize_colors(frame: &Frame, max_colors: usize) -> Vec<[u8; 3]> {
    // Histogram of unique colors, sorted so box splits are deterministic.
    let mut hist: HashMap<[u8; 3], u32> = HashMap::new();
    for y in 0..frame.height {
        for x in 0..frame.width {
            let (r, g, b) = frame.rgb_at(x, y);
            *hist.entry([r, g, b]).or_insert(0) += 1;
        }
    }
    let mut entries: Vec<([u8; 3], u32)> = hist.into_iter().collect();
    entries.sort_unstable_by_key(|(c, _)| *c);

    if entries.len() <= max_colors {
        return entries.into_iter().map(|(c, _)| c).collect();
    }

    // Boxes are index ranges over `entries`; split the widest box at the
    // median of its dominant channel until we have enough.
    let mut boxes: Vec<(usize, usize)> = vec![(0, entries.len())];
    while boxes.len() < max_colors {
        let Some((box_index, channel)) = widest_box(&entries, &boxes) else {
            break;
        };
        let (start, end) = boxes[box_index];
        entries[start..end].sort_unstable_by_key(|(c, _)| (c[channel], *c));
        let mid = start + (end - start) / 2;
        boxes[box_index] = (start, mid);
        boxes.push((mid, end));
    }

    boxes
        .iter()
        .map(|&(start, end)| average_color(&entries[start..end]))
        .collect()
}

/// The splittable box with the largest channel range, and that channel
fn widest_box(entries: &[([u8; 3], u32)], boxes: &[(usize, usize)]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, u8)> = None;
    for (i, &(start, end)) in boxes.iter().enumerate() {
        if end - start < 2 {
            continue;
        }
        for channel in 0..3 {
            let mut lo = u8::MAX;
            let mut hi = u8::MIN;
            for (c, _) in &entries[start..end] {
                lo = lo.min(c[channel]);
                hi = hi.max(c[channel]);
            }
            let range = hi - lo;
            if best.map(|(_, _, r)| range > r).unwrap_or(true) {
                best = Some((i, channel, range));
            }
        }
    }
    best.map(|(i, channel, _)| (i, channel))
}

/// Population-weighted mean color of a histogram slice
fn average_color(entries: &[([u8; 3], u32)]) -> [u8; 3] {
    let mut sum = [0u64; 3];
    let mut weight: u64 = 0;
    for (c, n) in entries {
        for ch in 0..3 {
            sum[ch] += c[ch] as u64 * *n as u64;
        }
        weight += *n as u64;
    }
    if weight == 0 {
        return [0, 0, 0];
    }
    [
        (sum[0] / weight) as u8,
        (sum[1] / weight) as u8,
        (sum[2] / weight) as u8,
    ]
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::frame::PixelFormat;
    use bytes::Bytes;

    fn solid_frame(w: u32, h: u32, rgb: [u8; 3]) -> Frame {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for _ in 0..w * h {
            data.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Frame::new(w, h, PixelFormat::Rgba8, Bytes::from(data), 0, 0).unwrap()
    }

    fn gradient_frame(w: u32, h: u32) -> Frame {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[
                    (x * 255 / w.max(1)) as u8,
                    (y * 255 / h.max(1)) as u8,
                    ((x + y) % 256) as u8,
                    255,
                ]);
            }
        }
        Frame::new(w, h, PixelFormat::Rgba8, Bytes::from(data), 0, 0).unwrap()
    }

    fn params() -> EncoderParams {
        EncoderParams {
            allow_intra_frames: true,
            lzw_compression: true,
            ..Default::default()
        }
    }

    #[test]
    fn empty_frame_is_invalid_input() {
        let mut engine = PaletteEngine::new(params());
        let frame = Frame {
            width: 0,
            height: 0,
            format: PixelFormat::Rgba8,
            data: Bytes::new(),
            timestamp_ms: 0,
            stream_index: 0,
        };
        assert!(matches!(
            engine.encode(&frame),
            Err(CastError::InvalidInput(_))
        ));
    }

    #[test]
    fn palette_bounded_and_indices_match_dimensions() {
        let mut engine = PaletteEngine::new(params());
        let frame = gradient_frame(64, 48);
        let indexed = engine.encode(&frame).unwrap();

        assert!(indexed.palette.color_count() <= MAX_PALETTE_COLORS + 1);
        assert_eq!(indexed.indices.len(), 64 * 48);
        assert_eq!(indexed.width, 64);
        assert_eq!(indexed.height, 48);
    }

    #[test]
    fn first_frame_is_keyframe() {
        let mut engine = PaletteEngine::new(params());
        let indexed = engine.encode(&solid_frame(8, 8, [10, 20, 30])).unwrap();
        assert!(indexed.keyframe);
    }

    #[test]
    fn unchanged_pixels_become_transparent() {
        let mut engine = PaletteEngine::new(params());
        let frame = solid_frame(16, 16, [200, 50, 50]);
        let first = engine.encode(&frame).unwrap();
        assert!(first.keyframe);

        let second = engine.encode(&frame).unwrap();
        assert!(!second.keyframe);
        assert!(second
            .indices
            .iter()
            .all(|&index| index == TRANSPARENT_INDEX));
    }

    #[test]
    fn force_prev_palette_returns_identical_palette() {
        let mut engine = PaletteEngine::new(EncoderParams {
            allow_intra_frames: true,
            force_prev_palette: true,
            ..Default::default()
        });
        let first = engine.encode(&gradient_frame(32, 32)).unwrap();
        // Wildly different content, palette must still be reused.
        let second = engine.encode(&solid_frame(32, 32, [0, 255, 0])).unwrap();
        assert_eq!(*first.palette, *second.palette);
    }

    #[test]
    fn force_prev_palette_survives_resize() {
        let mut engine = PaletteEngine::new(EncoderParams {
            allow_intra_frames: true,
            force_prev_palette: true,
            ..Default::default()
        });
        let first = engine.encode(&gradient_frame(32, 32)).unwrap();
        let second = engine.encode(&gradient_frame(16, 16)).unwrap();

        // The palette is dimension-independent; only the delta pass is
        // invalidated by the resize.
        assert_eq!(*first.palette, *second.palette);
        assert!(second.keyframe);
        assert_eq!(second.indices.len(), 16 * 16);
    }

    #[test]
    fn resize_forces_keyframe() {
        let mut engine = PaletteEngine::new(params());
        let _ = engine.encode(&solid_frame(16, 16, [80, 80, 80])).unwrap();
        let resized = engine.encode(&solid_frame(8, 8, [80, 80, 80])).unwrap();
        assert!(resized.keyframe);
        assert!(resized
            .indices
            .iter()
            .all(|&index| index != TRANSPARENT_INDEX));
    }

    #[test]
    fn intra_disallowed_means_every_frame_is_keyframe() {
        let mut engine = PaletteEngine::new(EncoderParams {
            allow_intra_frames: false,
            ..Default::default()
        });
        let frame = solid_frame(8, 8, [1, 2, 3]);
        assert!(engine.encode(&frame).unwrap().keyframe);
        assert!(engine.encode(&frame).unwrap().keyframe);
    }

    #[test]
    fn changed_content_regenerates_palette_as_keyframe() {
        let mut engine = PaletteEngine::new(params());
        let first = engine.encode(&solid_frame(16, 16, [255, 0, 0])).unwrap();
        let second = engine.encode(&solid_frame(16, 16, [0, 0, 255])).unwrap();
        assert!(first.keyframe);
        // Red palette cannot represent blue, so the palette regenerates.
        assert!(second.keyframe);
        assert_ne!(*first.palette, *second.palette);
    }

    #[test]
    fn nearest_tie_breaks_to_lowest_index() {
        let palette = Palette::from_colors(vec![[0, 0, 10], [0, 0, 30]]);
        // 20 is equidistant from both real entries.
        let index = palette.nearest(0, 0, 20);
        assert_eq!(index, 1);
    }

    #[test]
    fn quantizer_is_deterministic() {
        let frame = gradient_frame(64, 64);
        let a = quantize_colors(&frame, MAX_PALETTE_COLORS);
        let b = quantize_colors(&frame, MAX_PALETTE_COLORS);
        assert_eq!(a, b);
    }

    #[test]
    fn quantizer_resolves_palette_overflow() {
        // 64*64 gradient has far more than 255 distinct colors.
        let frame = gradient_frame(64, 64);
        let colors = quantize_colors(&frame, MAX_PALETTE_COLORS);
        assert!(colors.len() <= MAX_PALETTE_COLORS);
        assert!(!colors.is_empty());
    }

    #[test]
    fn debug_swatch_covers_palette() {
        let mut engine = PaletteEngine::new(EncoderParams {
            make_debug_palette: true,
            ..Default::default()
        });
        let indexed = engine.encode(&gradient_frame(64, 64)).unwrap();
        assert!(indexed.keyframe);
        assert_eq!(indexed.indices.len(), 64 * 64);
        // No transparency in a swatch.
        assert!(indexed.indices.iter().all(|&i| i != TRANSPARENT_INDEX));
    }

    #[test]
    fn debug_indexes_swaps_palette_for_grayscale_ramp() {
        let frame = gradient_frame(32, 32);

        let mut plain = PaletteEngine::new(params());
        let mut debug = PaletteEngine::new(EncoderParams {
            debug_indexes: true,
            ..params()
        });
        let expected = plain.encode(&frame).unwrap();
        let indexed = debug.encode(&frame).unwrap();

        // Same index map, grayscale colors.
        assert_eq!(indexed.indices, expected.indices);
        let colors = indexed.palette.colors();
        assert_eq!(colors.len(), expected.palette.colors().len());
        assert!(colors[1..].iter().all(|c| c[0] == c[1] && c[1] == c[2]));
        assert!(colors[1..].windows(2).all(|w| w[0][0] <= w[1][0]));
    }

    #[test]
    fn reset_forces_keyframe() {
        let mut engine = PaletteEngine::new(params());
        let frame = solid_frame(8, 8, [9, 9, 9]);
        let _ = engine.encode(&frame).unwrap();
        engine.reset();
        assert!(engine.encode(&frame).unwrap().keyframe);
    }
}
