//! Redirector: tells a client where the MRIM server lives.
//!
//! The client connects, reads `"<host>:<port>"` in ASCII and is disconnected.

use async_trait::async_trait;
use tracing::debug;

use crate::engine::{Connection, ConnectionHandler};
use crate::error::Result;

pub struct Redirector {
    target: String,
}

impl Redirector {
    pub fn new(host: &str, mrim_port: u16) -> Self {
        Self {
            target: format!("{host}:{mrim_port}"),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl ConnectionHandler for Redirector {
    fn name(&self) -> &'static str {
        "redirector"
    }

    async fn handle(&self, mut conn: Connection) -> Result<()> {
        conn.write_all(self.target.as_bytes()).await?;
        debug!(to = %self.target, "redirected");
        conn.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::time::Duration;

    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    #[tokio::test]
    async fn test_writes_target_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();

        let redirector = Redirector::new("mrim.example.org", 2041);
        redirector
            .handle(Connection::new(stream, peer, Duration::from_secs(1)))
            .await
            .unwrap();

        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "mrim.example.org:2041");
    }
}
