//! Animated-GIF encode-and-stream pipeline
//!
//! `gifcast` turns a stream of raw RGBA/BGRA frames into an animated GIF
//! and serves it over plain HTTP while it is still being written. The
//! pipeline for one instance:
//!
//! ```text
//! write_frame ─► encoder worker ─► palette engine ─► GIF serializer
//!                (per stream)      (median cut)      (LZW / uncompressed)
//!                                                         │
//!                        Muxer ◄─────────────────────────┘
//!                          │ growing-file flush
//!                          ▼
//!                     FileEndpoint ─► shared PortListener ─► GET clients
//! ```
//!
//! Typical use:
//!
//! ```no_run
//! use gifcast::{Caster, CasterParams, Frame, PixelFormat, PortRegistry};
//! use bytes::Bytes;
//!
//! # async fn demo(pixels: Bytes) -> gifcast::Result<()> {
//! let params = CasterParams::new("8080/cat.gif");
//! let caster = Caster::connect(PortRegistry::global(), &params).await?;
//!
//! let frame = Frame::new(320, 240, PixelFormat::Rgba8, pixels, caster.elapsed_ms(), 0)?;
//! caster.write_frame(frame).await?;
//! // ... more frames ...
//! caster.finish().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Hosts that pass instances across a language boundary register them in an
//! [`InstanceRegistry`] and work with opaque [`InstanceId`] handles instead.

pub mod caster;
pub mod config;
pub mod encoder;
pub mod error;
pub mod gif;
pub mod http;
pub mod instance;
pub mod media;
pub mod muxer;

pub use caster::Caster;
pub use config::{CastFlags, CasterParams, EncoderParams};
pub use error::{CastError, Result};
pub use http::{FileEndpoint, PortListener, PortRegistry};
pub use instance::{InstanceId, InstanceRegistry};
pub use media::frame::{Frame, PixelFormat};
pub use media::packet::{EncodedPacket, StreamDescriptor};
pub use muxer::{Muxer, StreamSink, StreamWriter};
