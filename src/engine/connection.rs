//! Accepted connection and the handler trait that owns it.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{ProtocolError, Result};

/// Random per-connection correlation id, rendered as 16 hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn random() -> Self {
        Self(rand::random::<u64>())
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({self})")
    }
}

/// A live socket plus whatever has been read from it but not yet consumed.
///
/// When one handler passes the connection to another, `buffered` carries the bytes the
/// first one read past its own last message.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub stream: TcpStream,
    pub buffered: BytesMut,
    pub idle_timeout: Duration,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, idle_timeout: Duration) -> Self {
        Self {
            id: ConnectionId::random(),
            peer,
            stream,
            buffered: BytesMut::with_capacity(4096),
            idle_timeout,
        }
    }

    /// Read more bytes into `buffered`. Returns 0 when the peer closed the stream.
    pub async fn read_more(&mut self) -> Result<usize> {
        match tokio::time::timeout(self.idle_timeout, self.stream.read_buf(&mut self.buffered)).await
        {
            Ok(read) => Ok(read?),
            Err(_) => Err(ProtocolError::ConnectionTimeout),
        }
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Flush and half-close; errors are irrelevant at this point.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Owns a connection for the rest of its life.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn handle(&self, conn: Connection) -> Result<()>;
}
