//! Per-instance pipeline assembly
//!
//! A [`Caster`] owns everything for one output target: the GIF sink and
//! muxer, one encoder worker per logical stream (spawned lazily on the
//! first frame for that stream), and the HTTP endpoint the container bytes
//! are published to. Frame timestamps are relative to the instance's
//! creation time; [`elapsed_ms`](Caster::elapsed_ms) is the matching
//! clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::config::{CastFlags, CasterParams, EncoderParams};
use crate::encoder::{self, EncoderHandle};
use crate::error::Result;
use crate::gif::writer::GifSink;
use crate::http::endpoint::FileEndpoint;
use crate::http::registry::{HttpFileWriter, PortRegistry};
use crate::media::frame::Frame;
use crate::media::packet::StreamDescriptor;
use crate::muxer::{Muxer, StreamWriter};

/// Default nominal frame rate used for the first frame's delay
const DEFAULT_FPS: u32 = 30;

/// One casting instance: encoder workers + muxer + output target
pub struct Caster {
    flags: CastFlags,
    params: EncoderParams,
    muxer: Arc<Muxer>,
    workers: Mutex<HashMap<usize, EncoderHandle>>,
    endpoint: Option<Arc<FileEndpoint>>,
    base_time: Instant,
}

impl Caster {
    /// Create an instance publishing to an HTTP endpoint
    ///
    /// Parses `params.address`, shares or binds the port listener, and
    /// allocates the file endpoint.
    pub async fn connect(registry: &PortRegistry, params: &CasterParams) -> Result<Self> {
        let writer = HttpFileWriter::connect(registry, &params.address).await?;
        let endpoint = Arc::clone(writer.endpoint());
        Ok(Self::build(params.flags, Box::new(writer), Some(endpoint)))
    }

    /// Create an instance publishing to an arbitrary byte writer
    pub fn with_writer(flags: CastFlags, writer: Box<dyn StreamWriter>) -> Self {
        Self::build(flags, writer, None)
    }

    fn build(
        flags: CastFlags,
        writer: Box<dyn StreamWriter>,
        endpoint: Option<Arc<FileEndpoint>>,
    ) -> Self {
        let sink = GifSink::new(writer);
        Self {
            flags,
            params: EncoderParams::from(flags),
            muxer: Arc::new(Muxer::new(Box::new(sink))),
            workers: Mutex::new(HashMap::new()),
            endpoint,
            base_time: Instant::now(),
        }
    }

    /// Milliseconds since this instance was created
    ///
    /// Use as the timestamp for frames captured "now".
    pub fn elapsed_ms(&self) -> u32 {
        self.base_time.elapsed().as_millis() as u32
    }

    /// Queue a frame for encoding
    ///
    /// The first frame seen for a stream index negotiates that stream with
    /// the muxer and spawns its worker; the frame's dimensions become the
    /// stream's dimensions.
    pub async fn write_frame(&self, frame: Frame) -> Result<()> {
        let mut workers = self.workers.lock().await;

        let handle = match workers.entry(frame.stream_index) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let mut descriptor = StreamDescriptor::new(
                    frame.stream_index,
                    frame.width,
                    frame.height,
                    frame.format,
                );
                descriptor.frames_per_second = DEFAULT_FPS;
                self.muxer.setup_streams(std::slice::from_ref(&descriptor))?;

                let default_delay_cs = (100 / DEFAULT_FPS.max(1)).max(1) as u16;
                tracing::debug!(stream = frame.stream_index, "Spawning encoder worker");
                entry.insert(encoder::spawn(
                    frame.stream_index,
                    self.params,
                    Arc::clone(&self.muxer),
                    default_delay_cs,
                ))
            }
        };

        handle.push_frame(frame)
    }

    /// Frames pushed but not yet encoded, across all streams
    pub async fn pending_packet_count(&self) -> usize {
        let workers = self.workers.lock().await;
        workers.values().map(|w| w.pending_frames()).sum()
    }

    /// Packets emitted to the muxer so far, across all streams
    pub async fn packets_written(&self) -> usize {
        let workers = self.workers.lock().await;
        workers.values().map(|w| w.packets_written()).sum()
    }

    /// Shut down the workers and finalize the container
    ///
    /// Worker shutdown is forced: frames still queued are dropped, so
    /// callers wanting every frame should wait for
    /// [`pending_packet_count`](Self::pending_packet_count) to reach zero
    /// first. Unless `SHOW_FINISHED_FILE` is set, the HTTP endpoint's
    /// buffer is cleared once the file is finalized.
    pub async fn finish(&self) -> Result<()> {
        let handles: Vec<EncoderHandle> = {
            let mut workers = self.workers.lock().await;
            workers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.join().await;
        }

        self.muxer.finish()?;

        if let Some(endpoint) = &self.endpoint {
            if !self.flags.contains(CastFlags::SHOW_FINISHED_FILE) {
                endpoint.write(&[]);
                tracing::debug!(path = %endpoint.path(), "Cleared finished endpoint");
            }
        }

        Ok(())
    }

    /// Whether [`finish`](Self::finish) has completed
    pub fn is_finished(&self) -> bool {
        self.muxer.is_finished()
    }

    /// The HTTP endpoint this instance publishes to, when HTTP-targeted
    pub fn endpoint(&self) -> Option<&Arc<FileEndpoint>> {
        self.endpoint.as_ref()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::frame::PixelFormat;
    use crate::muxer::MemoryWriter;
    use bytes::Bytes;
    use std::time::Duration;

    struct SharedWriter(Arc<MemoryWriter>);

    impl StreamWriter for SharedWriter {
        fn write(&self, data: &[u8]) {
            self.0.write(data);
        }
    }

    fn frame(timestamp_ms: u32, fill: u8) -> Frame {
        let data: Vec<u8> = std::iter::repeat([fill, 128, 255 - fill, 255])
            .take(16)
            .flatten()
            .collect();
        Frame::new(4, 4, PixelFormat::Rgba8, Bytes::from(data), timestamp_ms, 0).unwrap()
    }

    async fn drain(caster: &Caster, packets: usize) {
        for _ in 0..500 {
            if caster.packets_written().await >= packets {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("caster stalled at {} packets", caster.packets_written().await);
    }

    #[tokio::test]
    async fn writes_complete_gif_through_pipeline() {
        let output = Arc::new(MemoryWriter::new());
        let caster = Caster::with_writer(
            CastFlags::ALLOW_INTRA_FRAMES | CastFlags::LZW_COMPRESSION,
            Box::new(SharedWriter(Arc::clone(&output))),
        );

        for i in 0..5u32 {
            caster.write_frame(frame(i * 33, (i * 40) as u8)).await.unwrap();
        }
        drain(&caster, 5).await;
        caster.finish().await.unwrap();

        let file = output.snapshot();
        assert!(file.starts_with(b"GIF89a"));
        assert_eq!(*file.last().unwrap(), 0x3B);
        assert!(caster.is_finished());
    }

    #[tokio::test]
    async fn finish_is_idempotent() {
        let caster = Caster::with_writer(
            CastFlags::empty(),
            Box::new(MemoryWriter::new()),
        );
        caster.write_frame(frame(0, 1)).await.unwrap();
        drain(&caster, 1).await;
        caster.finish().await.unwrap();
        caster.finish().await.unwrap();
        assert!(caster.is_finished());
    }

    #[tokio::test]
    async fn finish_clears_endpoint_unless_show_finished() {
        let registry = PortRegistry::new();
        let params = CasterParams::new("0/done.gif").flags(CastFlags::LZW_COMPRESSION);
        let caster = Caster::connect(&registry, &params).await.unwrap();

        caster.write_frame(frame(0, 200)).await.unwrap();
        drain(&caster, 1).await;
        let endpoint = Arc::clone(caster.endpoint().unwrap());
        assert!(!endpoint.buffer().is_empty());

        caster.finish().await.unwrap();
        assert!(endpoint.buffer().is_empty());
    }

    #[tokio::test]
    async fn show_finished_file_keeps_endpoint() {
        let registry = PortRegistry::new();
        let params = CasterParams::new("0/kept.gif")
            .flags(CastFlags::SHOW_FINISHED_FILE | CastFlags::LZW_COMPRESSION);
        let caster = Caster::connect(&registry, &params).await.unwrap();

        caster.write_frame(frame(0, 60)).await.unwrap();
        drain(&caster, 1).await;
        caster.finish().await.unwrap();

        let file = caster.endpoint().unwrap().buffer();
        assert!(file.starts_with(b"GIF89a"));
        assert_eq!(*file.last().unwrap(), 0x3B);
    }
}
