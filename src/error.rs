//! Crate-wide error types
//!
//! All fallible operations return [`Result<T>`]. Errors are typed per the
//! failure domain: bad caller input, stream bookkeeping, sink writes, I/O.
//! Per-frame encode failures inside a worker are logged and swallowed by the
//! worker loop itself and never surface through these types.

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, CastError>;

/// The canonical error type for the casting pipeline
#[derive(Debug, Error)]
pub enum CastError {
    /// Malformed or empty input from the caller (e.g. a zero-sized frame)
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// An address string could not be parsed into port and path
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A packet referenced a stream index the muxer has never been told about
    #[error("no output stream for input stream {0}")]
    MissingStream(usize),

    /// A single stream's descriptor negotiation failed.
    ///
    /// Logged and skipped during `setup_streams`; sibling streams are not
    /// affected.
    #[error("stream setup failed: {0}")]
    StreamSetup(String),

    /// The container sink rejected a write or finalize.
    ///
    /// Fatal for the calling operation.
    #[error("sink error: {0}")]
    Sink(String),

    /// The underlying TCP/IO layer reported an error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker channel was closed unexpectedly
    #[error("channel closed")]
    ChannelClosed,

    /// An opaque instance handle did not resolve to a live instance
    #[error("no instance for handle {0}")]
    InstanceNotFound(u64),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CastError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        CastError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let e = CastError::MissingStream(3);
        assert!(e.to_string().contains('3'));

        let e = CastError::InvalidAddress("http//:".to_string());
        assert!(e.to_string().contains("invalid address"));
    }

    #[test]
    fn from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let e: CastError = io.into();
        assert!(matches!(e, CastError::Io(_)));
    }
}
