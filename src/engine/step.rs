//! Multi-step connection handling.
//!
//! A [`StepByStep`] handler builds a fresh chain of [`Step`]s for every connection and feeds
//! each one the connection's framing buffer until it produces an outcome. A step that cannot
//! decode a complete message yet fails with an incomplete-input error; the adaptor treats that
//! as "wait for more bytes" and retries once the socket delivers.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::engine::connection::{Connection, ConnectionHandler};
use crate::error::{ProtocolError, Result};

/// A handler failure carried as a value.
///
/// `reply` is written before anything else happens; `close` then ends the connection.
/// Without `close` the offending input is discarded and the connection stays open.
#[derive(Debug)]
pub struct Rejection {
    pub error: ProtocolError,
    pub reply: Vec<Bytes>,
    pub close: bool,
}

impl Rejection {
    pub fn new(error: ProtocolError) -> Self {
        Self {
            error,
            reply: Vec::new(),
            close: false,
        }
    }

    pub fn with_reply(mut self, bytes: Bytes) -> Self {
        self.reply.push(bytes);
        self
    }

    pub fn closing(mut self) -> Self {
        self.close = true;
        self
    }

    /// More input might have made this succeed.
    pub fn is_incomplete(&self) -> bool {
        self.reply.is_empty() && self.error.is_incomplete()
    }
}

impl From<ProtocolError> for Rejection {
    fn from(error: ProtocolError) -> Self {
        Rejection::new(error)
    }
}

/// What a step produced from one delivery.
#[derive(Default)]
pub struct StepOutcome {
    pub reply: Vec<Bytes>,
    pub end: bool,
    pub after: Option<Arc<dyn ConnectionHandler>>,
}

impl StepOutcome {
    pub fn reply(bytes: Bytes) -> Self {
        Self {
            reply: vec![bytes],
            ..Self::default()
        }
    }

    pub fn then_end(mut self) -> Self {
        self.end = true;
        self
    }

    /// After the reply is written, give the bare connection to `handler`.
    pub fn hand_off(mut self, handler: Arc<dyn ConnectionHandler>) -> Self {
        self.after = Some(handler);
        self
    }
}

impl std::fmt::Debug for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepOutcome")
            .field("reply", &self.reply)
            .field("end", &self.end)
            .field("after", &self.after.as_ref().map(|h| h.name()))
            .finish()
    }
}

/// One stage of a multi-step exchange.
pub trait Step: Send {
    fn name(&self) -> &'static str;

    /// Consume one complete message from the front of `input`.
    ///
    /// Must leave `input` untouched when it fails.
    fn advance(&mut self, input: &mut BytesMut) -> std::result::Result<StepOutcome, Rejection>;
}

pub type StepFactory = Arc<dyn Fn() -> Vec<Box<dyn Step>> + Send + Sync>;

pub struct StepByStep {
    name: &'static str,
    factory: StepFactory,
}

impl StepByStep {
    pub fn new<F>(name: &'static str, factory: F) -> Self
    where
        F: Fn() -> Vec<Box<dyn Step>> + Send + Sync + 'static,
    {
        Self {
            name,
            factory: Arc::new(factory),
        }
    }
}

async fn write_replies(conn: &mut Connection, replies: &[Bytes]) -> Result<()> {
    for bytes in replies {
        conn.write_all(bytes).await?;
    }
    Ok(())
}

#[async_trait]
impl ConnectionHandler for StepByStep {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, mut conn: Connection) -> Result<()> {
        let mut steps = (self.factory)().into_iter();
        let Some(mut current) = steps.next() else {
            conn.close().await;
            return Ok(());
        };

        loop {
            if conn.buffered.is_empty() && conn.read_more().await? == 0 {
                debug!(step = current.name(), "peer closed mid-exchange");
                return Ok(());
            }

            match current.advance(&mut conn.buffered) {
                Ok(outcome) => {
                    write_replies(&mut conn, &outcome.reply).await?;
                    if let Some(next) = outcome.after {
                        debug!(step = current.name(), handler = next.name(), "handing off connection");
                        return next.handle(conn).await;
                    }
                    if outcome.end {
                        conn.close().await;
                        return Ok(());
                    }
                    match steps.next() {
                        Some(step) => current = step,
                        None => {
                            debug!("last step finished");
                            conn.close().await;
                            return Ok(());
                        }
                    }
                }
                Err(rejection) if rejection.is_incomplete() => {
                    if conn.read_more().await? == 0 {
                        debug!(step = current.name(), "peer closed with a partial message");
                        return Ok(());
                    }
                }
                Err(rejection) => {
                    write_replies(&mut conn, &rejection.reply).await?;
                    if rejection.close {
                        debug!(step = current.name(), error = %rejection.error, "step rejected, closing");
                        conn.close().await;
                        return Ok(());
                    }
                    warn!(step = current.name(), error = %rejection.error, "discarding unusable input");
                    conn.buffered.clear();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::core::binary::BinaryReader;
    use bytes::Buf;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Reads a u16 length-prefixed word and echoes it upper-cased.
    struct Shout;

    impl Step for Shout {
        fn name(&self) -> &'static str {
            "shout"
        }

        fn advance(&mut self, input: &mut BytesMut) -> std::result::Result<StepOutcome, Rejection> {
            let mut reader = BinaryReader::network(&input[..]);
            let len = reader.read_u16()? as usize;
            let word = reader.bytes(len)?.to_ascii_uppercase();
            if word.is_empty() {
                return Err(Rejection::new(ProtocolError::Violation("empty".into()))
                    .with_reply(Bytes::from_static(b"?")));
            }
            let used = reader.position();
            input.advance(used);
            Ok(StepOutcome::reply(Bytes::from(word)))
        }
    }

    async fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (
            Connection::new(server, peer, Duration::from_secs(5)),
            client,
        )
    }

    #[tokio::test]
    async fn test_steps_run_in_order_across_split_reads() {
        let handler = StepByStep::new("shout", || {
            vec![Box::new(Shout) as Box<dyn Step>, Box::new(Shout)]
        });
        let (conn, mut client) = pair().await;
        let task = tokio::spawn(async move { handler.handle(conn).await });

        client.write_all(&[0, 2, b'h']).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.write_all(&[b'i', 0, 2, b'y', b'o']).await.unwrap();

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"HIYO");
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_rejection_without_close_discards_and_continues() {
        let handler = StepByStep::new("shout", || vec![Box::new(Shout) as Box<dyn Step>]);
        let (conn, mut client) = pair().await;
        let task = tokio::spawn(async move { handler.handle(conn).await });

        client.write_all(&[0, 0]).await.unwrap();
        let mut nak = [0u8; 1];
        client.read_exact(&mut nak).await.unwrap();
        assert_eq!(&nak, b"?");
        client.write_all(&[0, 2, b'o', b'k']).await.unwrap();

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"OK");
        task.await.unwrap().unwrap();
    }
}
