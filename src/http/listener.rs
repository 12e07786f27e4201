//! HTTP port listener
//!
//! Owns the TCP accept loop for one port and multiplexes path-addressed
//! file endpoints over it. Requests are plain HTTP/1.x, answered with
//! non-keep-alive responses: a registered path serves the endpoint's
//! current buffer, an unknown path serves an HTML listing of every
//! registered path on the port.
//!
//! Endpoints are created only by explicit allocation
//! ([`alloc_endpoint`](PortListener::alloc_endpoint)); a request never
//! creates one.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::http::endpoint::FileEndpoint;

/// Upper bound on the request head we are willing to buffer
const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Listener for one HTTP port
pub struct PortListener {
    port: u16,
    endpoints: RwLock<HashMap<String, Arc<FileEndpoint>>>,
    next_connection_id: AtomicU64,
}

impl PortListener {
    /// Bind the port and start the accept loop
    ///
    /// Port 0 binds an ephemeral port; [`port`](Self::port) reports the
    /// real one.
    pub async fn bind(port: u16) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let port = listener.local_addr()?.port();

        let this = Arc::new(Self {
            port,
            endpoints: RwLock::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
        });

        tracing::info!(port = port, "HTTP listener started");

        let accept = Arc::clone(&this);
        tokio::spawn(async move {
            accept.accept_loop(listener).await;
        });

        Ok(this)
    }

    /// The port this listener serves
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get or create the endpoint for `path`
    ///
    /// This is the only way an endpoint comes into existence; lookups from
    /// the request path never allocate.
    pub async fn alloc_endpoint(&self, path: &str) -> Arc<FileEndpoint> {
        let mut endpoints = self.endpoints.write().await;
        if let Some(endpoint) = endpoints.get(path) {
            return Arc::clone(endpoint);
        }
        let endpoint = Arc::new(FileEndpoint::new(path));
        endpoints.insert(path.to_string(), Arc::clone(&endpoint));
        tracing::info!(port = self.port, path = path, "Endpoint allocated");
        endpoint
    }

    /// Look up an existing endpoint
    pub async fn endpoint(&self, path: &str) -> Option<Arc<FileEndpoint>> {
        self.endpoints.read().await.get(path).cloned()
    }

    /// All registered paths, sorted
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.endpoints.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Listing page body for an unknown request path
    pub async fn listing_body(&self, requested: &str) -> String {
        let mut body = format!("<p>File not found: {requested}</p>\n");
        for path in self.paths().await {
            body.push_str(&format!("<p><a href=\"{path}\">{path}</a></p>\n"));
        }
        body
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = this.handle_connection(socket, peer_addr).await {
                            tracing::debug!(
                                port = this.port,
                                peer = %peer_addr,
                                error = %e,
                                "Connection error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(port = self.port, error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        mut socket: TcpStream,
        peer_addr: SocketAddr,
    ) -> std::io::Result<()> {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        let Some(path) = read_request_path(&mut socket).await? else {
            tracing::debug!(port = self.port, peer = %peer_addr, "Malformed request");
            return Ok(());
        };

        tracing::debug!(
            port = self.port,
            peer = %peer_addr,
            connection = connection_id,
            path = %path,
            "Request"
        );

        match self.endpoint(&path).await {
            Some(endpoint) => {
                let body = endpoint.start_response(connection_id);
                let result =
                    write_response(&mut socket, "200 OK", "image/gif", &body).await;
                endpoint.end_response(connection_id);
                result?;
            }
            None => {
                let body = self.listing_body(&path).await;
                write_response(&mut socket, "404 Not Found", "text/html", body.as_bytes())
                    .await?;
            }
        }

        socket.shutdown().await
    }
}

/// Read the request head and extract the target path
///
/// Returns `None` for anything that is not a parseable HTTP request line.
async fn read_request_path(socket: &mut TcpStream) -> std::io::Result<Option<String>> {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];

    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        if head.len() > MAX_REQUEST_BYTES {
            return Ok(None);
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&head);
    let request_line = head.lines().next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let (Some(_method), Some(target)) = (parts.next(), parts.next()) else {
        return Ok(None);
    };

    // Ignore any query string.
    let path = target.split('?').next().unwrap_or(target);
    Ok(Some(path.to_string()))
}

/// Write one non-keep-alive HTTP/1.1 response
async fn write_response(
    socket: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &[u8],
) -> std::io::Result<()> {
    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    socket.write_all(header.as_bytes()).await?;
    socket.write_all(body).await?;
    socket.flush().await
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn get(port: u16, path: &str) -> (String, Vec<u8>) {
        let mut socket = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        socket.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        socket.read_to_end(&mut response).await.unwrap();

        let split = response
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response head");
        let head = String::from_utf8_lossy(&response[..split]).to_string();
        let body = response[split + 4..].to_vec();
        (head, body)
    }

    #[tokio::test]
    async fn serves_endpoint_buffer() {
        let listener = PortListener::bind(0).await.unwrap();
        let endpoint = listener.alloc_endpoint("/cat.gif").await;
        endpoint.write(b"GIF89a-data");

        let (head, body) = get(listener.port(), "/cat.gif").await;
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains("Content-Type: image/gif"));
        assert!(head.contains("Connection: close"));
        assert_eq!(body, b"GIF89a-data");
    }

    #[tokio::test]
    async fn unknown_path_lists_registered_paths() {
        let listener = PortListener::bind(0).await.unwrap();
        listener.alloc_endpoint("/a.gif").await;
        listener.alloc_endpoint("/b.gif").await;

        let (head, body) = get(listener.port(), "/missing.gif").await;
        let body = String::from_utf8(body).unwrap();

        assert!(head.starts_with("HTTP/1.1 404 Not Found"));
        assert!(body.contains("File not found: /missing.gif"));
        assert!(body.contains("<a href=\"/a.gif\">"));
        assert!(body.contains("<a href=\"/b.gif\">"));
        assert_eq!(body.matches("<a href=").count(), 2);
    }

    #[tokio::test]
    async fn empty_port_lists_nothing() {
        let listener = PortListener::bind(0).await.unwrap();
        let (head, body) = get(listener.port(), "/anything").await;
        let body = String::from_utf8(body).unwrap();

        assert!(head.starts_with("HTTP/1.1 404 Not Found"));
        assert_eq!(body.matches("<a href=").count(), 0);
    }

    #[tokio::test]
    async fn sequential_requests_see_buffer_at_request_time() {
        let listener = PortListener::bind(0).await.unwrap();
        let endpoint = listener.alloc_endpoint("/live.gif").await;

        endpoint.write(b"version-1");
        let (_, first) = get(listener.port(), "/live.gif").await;

        endpoint.write(b"version-2-longer");
        let (_, second) = get(listener.port(), "/live.gif").await;

        assert_eq!(first, b"version-1");
        assert_eq!(second, b"version-2-longer");
    }

    #[tokio::test]
    async fn alloc_endpoint_is_idempotent() {
        let listener = PortListener::bind(0).await.unwrap();
        let first = listener.alloc_endpoint("/x.gif").await;
        let second = listener.alloc_endpoint("/x.gif").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(listener.paths().await, vec!["/x.gif".to_string()]);
    }
}
