//! WebSocket server the automation extension connects to.
//!
//! # Connection Flow
//!
//! 1. Bind to `127.0.0.1:0` and let the OS pick a port
//! 2. Launch Firefox with an init page that carries the WebSocket URL
//! 3. The extension connects and sends READY
//! 4. [`PendingServer::accept`] hands back a live [`Connection`]

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::Connection;
use super::connection::ReadyData;

// ============================================================================
// Constants
// ============================================================================

/// How long Firefox gets to start and connect.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// PendingServer
// ============================================================================

/// A WebSocket server that is bound but not yet connected.
///
/// Accepts exactly one connection: one browser, one extension.
pub struct PendingServer {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Port the server is bound to.
    port: u16,
}

impl PendingServer {
    /// Binds to `ip:port`; port 0 picks a free one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let port = listener.local_addr()?.port();

        debug!(port, "WebSocket server bound");
        Ok(Self { listener, port })
    }

    /// Binds to a random localhost port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind_localhost() -> Result<Self> {
        Self::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the URL handed to the extension, `ws://127.0.0.1:{port}`.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Accepts the extension's connection and completes the handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if Firefox doesn't connect in time
    /// - [`Error::Connection`] if the WebSocket upgrade fails
    /// - [`Error::ConnectionTimeout`] if READY never arrives
    pub async fn accept(self) -> Result<(Connection, ReadyData)> {
        let (stream, addr) = timeout(CONNECTION_TIMEOUT, self.listener.accept())
            .await
            .map_err(|_| Error::connection_timeout(CONNECTION_TIMEOUT.as_millis() as u64))??;

        debug!(?addr, "TCP connection accepted");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        info!(port = self.port, "Extension connected");

        let connection = Connection::new(ws_stream);
        let ready = connection.wait_ready().await?;
        Ok((connection, ready))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_localhost_random_port() {
        let server = PendingServer::bind_localhost().await.expect("bind");
        assert!(server.port() > 0);
        assert_eq!(server.ws_url(), format!("ws://127.0.0.1:{}", server.port()));
    }

    #[tokio::test]
    async fn test_two_servers_get_distinct_ports() {
        let a = PendingServer::bind_localhost().await.expect("bind a");
        let b = PendingServer::bind_localhost().await.expect("bind b");
        assert_ne!(a.port(), b.port());
    }
}
