//! Port registry and HTTP stream writer
//!
//! The [`PortRegistry`] maps port numbers to live [`PortListener`]s, at
//! most one per port. Independent casting instances that pick the same
//! port share a listener. The registry is explicitly-owned process-scoped
//! state: created on first use via [`PortRegistry::global`], torn down at
//! process exit; the encode pipeline itself never depends on it (a
//! registry can equally be constructed locally, as the tests do).

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;

use crate::error::Result;
use crate::http::address::parse_address;
use crate::http::endpoint::FileEndpoint;
use crate::http::listener::PortListener;
use crate::muxer::StreamWriter;

/// Process-wide port → listener map
#[derive(Default)]
pub struct PortRegistry {
    listeners: Mutex<HashMap<u16, Arc<PortListener>>>,
}

impl PortRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, created on first use
    pub fn global() -> &'static PortRegistry {
        static GLOBAL: OnceLock<PortRegistry> = OnceLock::new();
        GLOBAL.get_or_init(PortRegistry::new)
    }

    /// Get the listener for `port`, binding it on first use
    ///
    /// Idempotent: later calls for the same port return the existing
    /// listener.
    pub async fn get_or_create(&self, port: u16) -> Result<Arc<PortListener>> {
        let mut listeners = self.listeners.lock().await;
        if let Some(listener) = listeners.get(&port) {
            return Ok(Arc::clone(listener));
        }

        let listener = PortListener::bind(port).await?;
        listeners.insert(port, Arc::clone(&listener));
        Ok(listener)
    }

    /// Number of live listeners
    pub async fn listener_count(&self) -> usize {
        self.listeners.lock().await.len()
    }
}

/// [`StreamWriter`] publishing container bytes to an HTTP endpoint
pub struct HttpFileWriter {
    endpoint: Arc<FileEndpoint>,
    port: u16,
}

impl HttpFileWriter {
    /// Resolve `address` ("port/path") and allocate its endpoint
    pub async fn connect(registry: &PortRegistry, address: &str) -> Result<Self> {
        let (port, path) = parse_address(address)?;
        let listener = registry.get_or_create(port).await?;
        let endpoint = listener.alloc_endpoint(&path).await;
        // Ephemeral binds resolve port 0 to the real port.
        let port = listener.port();

        tracing::info!(port = port, path = %endpoint.path(), "HTTP cast target ready");
        Ok(Self { endpoint, port })
    }

    /// The endpoint this writer publishes to
    pub fn endpoint(&self) -> &Arc<FileEndpoint> {
        &self.endpoint
    }

    /// The resolved port
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl StreamWriter for HttpFileWriter {
    fn write(&self, data: &[u8]) {
        self.endpoint.write(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_port_returns_same_listener() {
        let registry = PortRegistry::new();
        let first = registry.get_or_create(0).await.unwrap();
        let second = registry.get_or_create(0).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.listener_count().await, 1);
    }

    #[tokio::test]
    async fn writer_publishes_to_endpoint() {
        let registry = PortRegistry::new();
        let writer = HttpFileWriter::connect(&registry, "0/out.gif").await.unwrap();
        writer.write(b"payload");
        assert_eq!(&writer.endpoint().buffer()[..], b"payload");
        assert_eq!(writer.endpoint().path(), "/out.gif");
    }

    #[tokio::test]
    async fn two_writers_same_port_share_listener() {
        let registry = PortRegistry::new();
        let first = HttpFileWriter::connect(&registry, "0/a.gif").await.unwrap();
        let second = HttpFileWriter::connect(&registry, "0/b.gif").await.unwrap();
        assert_eq!(first.port(), second.port());
        assert_eq!(registry.listener_count().await, 1);
    }
}
