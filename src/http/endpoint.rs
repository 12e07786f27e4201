//! Path-addressed file endpoints
//!
//! A [`FileEndpoint`] holds the most recently flushed bytes for one path on
//! one port. Writers replace the buffer wholesale; each client connection
//! receives one complete snapshot of whatever the buffer holds at request
//! time. Connections that already completed never see later rewrites.

use std::collections::HashSet;
use std::sync::Mutex;

use bytes::Bytes;

use crate::muxer::StreamWriter;

/// Latest-bytes buffer for one path, shared by writer and listener
pub struct FileEndpoint {
    path: String,
    state: Mutex<EndpointState>,
}

struct EndpointState {
    buffer: Bytes,
    /// Connection ids that have been served; duplicate registrations are
    /// warned about and reuse the original registration
    connections: HashSet<u64>,
}

impl FileEndpoint {
    /// Create an empty endpoint for `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(EndpointState {
                buffer: Bytes::new(),
                connections: HashSet::new(),
            }),
        }
    }

    /// The path this endpoint serves
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replace the stored bytes
    pub fn write(&self, data: &[u8]) {
        let mut state = self.state.lock().expect("endpoint lock");
        state.buffer = Bytes::copy_from_slice(data);
    }

    /// Current buffer snapshot
    pub fn buffer(&self) -> Bytes {
        self.state.lock().expect("endpoint lock").buffer.clone()
    }

    /// Register `connection_id` and take the snapshot to serve it
    ///
    /// Registering the same connection twice is logged as a warning; the
    /// existing registration is reused, not replaced.
    pub fn start_response(&self, connection_id: u64) -> Bytes {
        let mut state = self.state.lock().expect("endpoint lock");
        if !state.connections.insert(connection_id) {
            tracing::warn!(
                path = %self.path,
                connection = connection_id,
                "Connection already registered on endpoint, reusing"
            );
        }
        state.buffer.clone()
    }

    /// Forget a connection once its request lifecycle ends
    pub fn end_response(&self, connection_id: u64) {
        let mut state = self.state.lock().expect("endpoint lock");
        state.connections.remove(&connection_id);
    }

    /// Number of currently registered connections
    pub fn connection_count(&self) -> usize {
        self.state.lock().expect("endpoint lock").connections.len()
    }
}

impl StreamWriter for std::sync::Arc<FileEndpoint> {
    fn write(&self, data: &[u8]) {
        FileEndpoint::write(self, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_replaces_wholesale() {
        let endpoint = FileEndpoint::new("/cat.gif");
        endpoint.write(b"first version");
        endpoint.write(b"v2");
        assert_eq!(endpoint.buffer(), Bytes::from_static(b"v2"));
    }

    #[test]
    fn each_response_sees_buffer_at_request_time() {
        let endpoint = FileEndpoint::new("/cat.gif");

        endpoint.write(b"one");
        let first = endpoint.start_response(1);
        endpoint.write(b"two");
        let second = endpoint.start_response(2);

        assert_eq!(first, Bytes::from_static(b"one"));
        assert_eq!(second, Bytes::from_static(b"two"));
    }

    #[test]
    fn duplicate_connection_is_reused() {
        let endpoint = FileEndpoint::new("/cat.gif");
        endpoint.write(b"data");

        endpoint.start_response(7);
        endpoint.start_response(7);
        assert_eq!(endpoint.connection_count(), 1);

        endpoint.end_response(7);
        assert_eq!(endpoint.connection_count(), 0);
    }
}
