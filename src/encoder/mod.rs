//! Frame encoder worker
//!
//! One worker task per output stream. The worker owns a FIFO queue of
//! pending raw frames and the palette engine's previous-frame context;
//! nothing else touches either. Each iteration pops one frame, runs the
//! palette engine, serializes the result into a GIF image block, and hands
//! the packet to the muxer.
//!
//! The worker parks on its empty queue and wakes on push or on the
//! cancellation token. Cancellation is a separate signal from queue
//! wake-ups so shutdown is observable even when no frame will ever arrive
//! again (e.g. the host suspended rendering). Per-frame failures are
//! logged and that iteration simply produces no packet; the worker never
//! dies with the stream still open.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EncoderParams;
use crate::error::Result;
use crate::gif::palette::PaletteEngine;
use crate::gif::writer::serialize_image;
use crate::media::frame::Frame;
use crate::media::packet::EncodedPacket;
use crate::muxer::Muxer;

/// Handle to a running encoder worker
///
/// Dropping the handle does not stop the worker; call
/// [`shutdown`](Self::shutdown) or [`join`](Self::join).
pub struct EncoderHandle {
    stream_index: usize,
    tx: mpsc::UnboundedSender<Frame>,
    pending: Arc<AtomicUsize>,
    packets_written: Arc<AtomicUsize>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EncoderHandle {
    /// Queue a frame for encoding
    ///
    /// Frames are drained strictly in push order. The queue is unbounded;
    /// producers can watch [`pending_frames`](Self::pending_frames) or set
    /// the skip-frames parameter to bound latency.
    pub fn push_frame(&self, frame: Frame) -> Result<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(frame).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            e.into()
        })
    }

    /// Caller-facing alias for [`push_frame`](Self::push_frame)
    pub fn write(&self, frame: Frame) -> Result<()> {
        self.push_frame(frame)
    }

    /// Number of frames pushed but not yet consumed
    pub fn pending_frames(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Number of packets emitted to the muxer so far
    pub fn packets_written(&self) -> usize {
        self.packets_written.load(Ordering::SeqCst)
    }

    /// Whether the worker may park (true only with an empty queue)
    pub fn can_sleep(&self) -> bool {
        self.pending_frames() == 0
    }

    /// The stream this worker encodes
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Signal the worker to stop
    ///
    /// Idempotent, and forcibly releases the worker from its queue wait
    /// even if no frame ever arrives again.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Shut down and wait for the worker task to exit
    pub async fn join(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Spawn an encoder worker for `stream_index`, emitting to `muxer`
///
/// `default_delay_cs` is the frame delay used until two timestamps are
/// available to measure a real interval.
pub fn spawn(
    stream_index: usize,
    params: EncoderParams,
    muxer: Arc<Muxer>,
    default_delay_cs: u16,
) -> EncoderHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    let packets_written = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();

    let worker = Worker {
        stream_index,
        params,
        engine: PaletteEngine::new(params),
        muxer,
        rx,
        pending: Arc::clone(&pending),
        packets_written: Arc::clone(&packets_written),
        cancel: cancel.clone(),
        prev_timestamp_ms: None,
        default_delay_cs,
    };

    let task = tokio::spawn(worker.run());

    EncoderHandle {
        stream_index,
        tx,
        pending,
        packets_written,
        cancel,
        task: Some(task),
    }
}

struct Worker {
    stream_index: usize,
    params: EncoderParams,
    engine: PaletteEngine,
    muxer: Arc<Muxer>,
    rx: mpsc::UnboundedReceiver<Frame>,
    pending: Arc<AtomicUsize>,
    packets_written: Arc<AtomicUsize>,
    cancel: CancellationToken,
    prev_timestamp_ms: Option<u32>,
    default_delay_cs: u16,
}

impl Worker {
    async fn run(mut self) {
        tracing::debug!(stream = self.stream_index, "Encoder worker started");

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                frame = self.rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            self.pending.fetch_sub(1, Ordering::SeqCst);

            let frame = if self.params.skip_frames {
                self.drain_to_newest(frame)
            } else {
                frame
            };

            self.encode_one(frame);
        }

        tracing::debug!(
            stream = self.stream_index,
            packets = self.packets_written.load(Ordering::SeqCst),
            "Encoder worker stopped"
        );
    }

    /// Drop queued backlog, keeping only the most recent frame
    fn drain_to_newest(&mut self, mut frame: Frame) -> Frame {
        let mut skipped = 0usize;
        while let Ok(newer) = self.rx.try_recv() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            frame = newer;
            skipped += 1;
        }
        if skipped > 0 {
            tracing::debug!(
                stream = self.stream_index,
                skipped = skipped,
                "Skipped stale frames"
            );
        }
        frame
    }

    /// Encode and emit one frame; failures are logged, never fatal
    fn encode_one(&mut self, frame: Frame) {
        let timestamp_ms = frame.timestamp_ms;
        let delay_cs = match self.prev_timestamp_ms {
            Some(prev) if timestamp_ms > prev => (((timestamp_ms - prev) + 5) / 10).max(1) as u16,
            _ => self.default_delay_cs,
        };

        let indexed = match self.engine.encode(&frame) {
            Ok(indexed) => indexed,
            Err(e) => {
                tracing::warn!(
                    stream = self.stream_index,
                    error = %e,
                    "Frame encode failed, dropping frame"
                );
                return;
            }
        };
        self.prev_timestamp_ms = Some(timestamp_ms);

        let keyframe = indexed.keyframe;
        let data = match serialize_image(
            &indexed,
            delay_cs,
            self.params.lzw_compression,
            !self.params.debug_transparency,
        ) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(
                    stream = self.stream_index,
                    error = %e,
                    "Frame serialization failed, dropping frame"
                );
                return;
            }
        };
        let packet = EncodedPacket::new(self.stream_index, timestamp_ms, keyframe, data);

        match self.muxer.process_packet(&packet) {
            Ok(()) => {
                self.packets_written.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::error!(
                    stream = self.stream_index,
                    error = %e,
                    "Muxer rejected packet"
                );
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
