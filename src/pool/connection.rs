// src/pool/connection.rs

//! Connection handles and the factory that creates and destroys them.
//!
//! The factory is the only code that touches backend transport. The pool
//! treats connections as opaque: it needs an identity to keep its lent
//! ledger honest and a liveness bit so closed sessions never re-enter the
//! idle set.

use crate::common::error::{PoolError, Result};
use crate::config::BackendConfig;
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

/// Identity of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A backend session the pool can lend out.
pub trait Connection: Send + 'static {
    /// Stable identity for the lifetime of the session.
    fn id(&self) -> ConnectionId;

    /// Whether the session is known to be unusable.
    fn is_closed(&self) -> bool;
}

/// Creates and destroys backend connections from fixed configuration.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The connection type this factory produces.
    type Connection: Connection;

    /// Open a new session. Fails with `PoolError::BackendUnavailable` when the
    /// backend cannot be reached or refuses the session.
    async fn create(&self) -> Result<Self::Connection>;

    /// Release backend-side resources. Best-effort: the pool logs failures
    /// and never hands them to callers.
    async fn destroy(&self, conn: Self::Connection) -> Result<()>;
}

/// A plain TCP session to the backend.
#[derive(Debug)]
pub struct TcpConnection {
    id: ConnectionId,
    stream: TcpStream,
    broken: AtomicBool,
}

impl TcpConnection {
    fn new(stream: TcpStream) -> Self {
        Self {
            id: ConnectionId::new(),
            stream,
            broken: AtomicBool::new(false),
        }
    }

    /// The underlying socket.
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Flag the session as unusable, e.g. after a protocol desync.
    pub fn mark_broken(&self) {
        self.broken.store(true, Ordering::Release);
    }
}

impl Connection for TcpConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_closed(&self) -> bool {
        if self.broken.load(Ordering::Acquire) {
            return true;
        }

        // An idle session has nothing to read: EOF means the peer hung up,
        // unsolicited bytes mean the session is out of step.
        let mut probe = [0u8; 1];
        let closed = match self.stream.try_read(&mut probe) {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(_) => true,
        };
        if closed {
            self.mark_broken();
        }
        closed
    }
}

/// Opens TCP sessions to a configured backend.
#[derive(Debug, Clone)]
pub struct TcpConnectionFactory {
    backend: BackendConfig,
}

impl TcpConnectionFactory {
    pub fn new(backend: BackendConfig) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnectionFactory {
    type Connection = TcpConnection;

    async fn create(&self) -> Result<TcpConnection> {
        let address = self.backend.address();
        let connect_timeout = self.backend.connect_timeout();

        let stream = match timeout(connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(PoolError::BackendUnavailable(format!(
                    "Failed to connect to {}: {}",
                    address, e
                )));
            }
            Err(_) => {
                return Err(PoolError::BackendUnavailable(format!(
                    "Timed out connecting to {} after {:?}",
                    address, connect_timeout
                )));
            }
        };

        if self.backend.tcp_nodelay {
            stream.set_nodelay(true).map_err(|e| {
                PoolError::BackendUnavailable(format!("Failed to configure socket for {}: {}", address, e))
            })?;
        }

        let conn = TcpConnection::new(stream);
        debug!("Opened backend connection {} to {}", conn.id, address);
        Ok(conn)
    }

    async fn destroy(&self, conn: TcpConnection) -> Result<()> {
        let id = conn.id;
        let mut stream = conn.stream;
        stream.shutdown().await?;
        debug!("Closed backend connection {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn backend_for(port: u16) -> BackendConfig {
        BackendConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_ms: 1_000,
            tcp_nodelay: true,
        }
    }

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[tokio::test]
    async fn test_create_and_destroy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let factory = TcpConnectionFactory::new(backend_for(port));

        let conn = factory.create().await.unwrap();
        let (_peer, _) = listener.accept().await.unwrap();
        assert!(!conn.is_closed());

        factory.destroy(conn).await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_is_backend_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let factory = TcpConnectionFactory::new(backend_for(port));
        let result = factory.create().await;
        assert!(matches!(result, Err(PoolError::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_peer_hangup_reports_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let factory = TcpConnectionFactory::new(backend_for(port));

        let conn = factory.create().await.unwrap();
        let (peer, _) = listener.accept().await.unwrap();
        drop(peer);

        let mut closed = false;
        for _ in 0..50 {
            conn.stream().readable().await.unwrap();
            if conn.is_closed() {
                closed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(closed);
    }

    #[tokio::test]
    async fn test_mark_broken() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let factory = TcpConnectionFactory::new(backend_for(port));

        let conn = factory.create().await.unwrap();
        let (_peer, _) = listener.accept().await.unwrap();
        conn.mark_broken();
        assert!(conn.is_closed());
    }
}
