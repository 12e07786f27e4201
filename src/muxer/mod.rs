//! Stream muxing
//!
//! The [`Muxer`] sequences encoded packets into an abstract container sink.
//! It is a small state machine:
//!
//! ```text
//! Created ──setup_streams──► Streams-Configured ──process_packet──► Started ──finish──► Finished
//! ```
//!
//! All three entry points share one exclusive lock, so calls are mutually
//! exclusive and the sink sees writes in exactly the order `process_packet`
//! was invoked. `finish` is idempotent; the sink is finalized and the
//! completion callback fired exactly once.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{CastError, Result};
use crate::media::packet::{EncodedPacket, StreamDescriptor};

// ── Sink capabilities ────────────────────────────────────────────

/// Abstract container sink, implemented per target format
///
/// Calls arrive in a fixed order: every `add_stream`/`set_input_format`
/// before `begin_writing`, every `write_sample` after it, `finalize` last.
pub trait StreamSink: Send {
    /// Declare an output stream; returns the sink's output stream index
    fn add_stream(&mut self, descriptor: &StreamDescriptor) -> Result<usize>;

    /// Describe the input format feeding an already-declared output stream
    fn set_input_format(&mut self, output_index: usize, descriptor: &StreamDescriptor)
        -> Result<()>;

    /// Begin writing; called exactly once, before the first sample
    fn begin_writing(&mut self) -> Result<()>;

    /// Append one encoded sample to an output stream
    fn write_sample(&mut self, output_index: usize, packet: &EncodedPacket) -> Result<()>;

    /// Finalize the container; called exactly once
    fn finalize(&mut self) -> Result<()>;
}

/// Destination for finalized container bytes
///
/// Implementations receive the complete file contents so far on every flush
/// (growing-file semantics); they must not block on I/O.
pub trait StreamWriter: Send + Sync {
    /// Replace the destination's view of the file with `data`
    fn write(&self, data: &[u8]);
}

/// In-memory writer, used in tests and for keeping a finished file around
#[derive(Debug, Default)]
pub struct MemoryWriter {
    data: Mutex<Vec<u8>>,
}

impl MemoryWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the latest flushed bytes
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().expect("memory writer lock").clone()
    }
}

impl StreamWriter for MemoryWriter {
    fn write(&self, data: &[u8]) {
        let mut guard = self.data.lock().expect("memory writer lock");
        guard.clear();
        guard.extend_from_slice(data);
    }
}

// ── Muxer ────────────────────────────────────────────────────────

/// Completion callback, fired once when the muxer finishes
pub type OnFinished = Box<dyn FnOnce() + Send>;

struct MuxerInner {
    sink: Box<dyn StreamSink>,
    /// Input stream index → sink output stream index
    stream_map: HashMap<usize, usize>,
    started: bool,
    finished: bool,
    on_finished: Option<OnFinished>,
}

/// Per-output-target packet sequencer
pub struct Muxer {
    inner: Mutex<MuxerInner>,
}

impl Muxer {
    /// Create a muxer over `sink`
    pub fn new(sink: Box<dyn StreamSink>) -> Self {
        Self::with_completion(sink, None)
    }

    /// Create a muxer that fires `on_finished` when [`finish`](Self::finish)
    /// first completes
    pub fn with_completion(sink: Box<dyn StreamSink>, on_finished: Option<OnFinished>) -> Self {
        Self {
            inner: Mutex::new(MuxerInner {
                sink,
                stream_map: HashMap::new(),
                started: false,
                finished: false,
                on_finished,
            }),
        }
    }

    /// Declare output streams
    ///
    /// May be called multiple times; descriptors for an already-known input
    /// index are logged and skipped, never overwritten. A single stream's
    /// setup failure is logged and that stream skipped; siblings continue.
    pub fn setup_streams(&self, streams: &[StreamDescriptor]) -> Result<()> {
        let mut inner = self.inner.lock().expect("muxer lock");

        for descriptor in streams {
            if inner.stream_map.contains_key(&descriptor.stream_index) {
                tracing::debug!(
                    stream = %descriptor,
                    "Input stream already has an output stream, skipping"
                );
                continue;
            }

            match Self::setup_one(&mut inner.sink, descriptor) {
                Ok(output_index) => {
                    inner.stream_map.insert(descriptor.stream_index, output_index);
                    tracing::debug!(
                        stream = %descriptor,
                        output_index = output_index,
                        "Output stream configured"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        stream = %descriptor,
                        error = %e,
                        "Failed to create output stream, skipping"
                    );
                }
            }
        }

        Ok(())
    }

    fn setup_one(
        sink: &mut Box<dyn StreamSink>,
        descriptor: &StreamDescriptor,
    ) -> Result<usize> {
        let output_index = sink
            .add_stream(descriptor)
            .map_err(|e| CastError::StreamSetup(e.to_string()))?;
        sink.set_input_format(output_index, descriptor)
            .map_err(|e| CastError::StreamSetup(e.to_string()))?;
        Ok(output_index)
    }

    /// Write one packet to the sink, in call order
    ///
    /// The first call begins the sink. Fails with `MissingStream` when the
    /// packet's input stream was never configured; sink failures propagate.
    pub fn process_packet(&self, packet: &EncodedPacket) -> Result<()> {
        let mut inner = self.inner.lock().expect("muxer lock");

        if inner.finished {
            return Err(CastError::Sink("muxer already finished".to_string()));
        }

        if !inner.started {
            inner.sink.begin_writing()?;
            inner.started = true;
        }

        let output_index = *inner
            .stream_map
            .get(&packet.stream_index)
            .ok_or(CastError::MissingStream(packet.stream_index))?;

        inner.sink.write_sample(output_index, packet)
    }

    /// Finalize the sink and fire the completion callback
    ///
    /// Idempotent: repeat calls are no-ops.
    pub fn finish(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("muxer lock");

        if inner.finished {
            return Ok(());
        }

        inner.sink.finalize()?;
        inner.finished = true;

        if let Some(callback) = inner.on_finished.take() {
            callback();
        }

        tracing::debug!("Muxer finished");
        Ok(())
    }

    /// Whether [`finish`](Self::finish) has completed
    pub fn is_finished(&self) -> bool {
        self.inner.lock().expect("muxer lock").finished
    }
}

// ── Tests ────────────────────────────────────────────────────────
