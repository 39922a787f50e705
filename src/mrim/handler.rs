//! Connection handler for MRIM clients.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{debug, debug_span, info, warn, Instrument};

use crate::core::codec::MrimCodec;
use crate::core::packet::Packet;
use crate::engine::{Connection, ConnectionHandler, Rejection};
use crate::error::{ErrorKind, ProtocolError, Result};
use crate::mrim::registry::{Outgoing, SessionHandle};
use crate::mrim::session::Session;
use crate::mrim::MrimContext;
use crate::protocol::commands::command_name;
use crate::utils::metrics::global_metrics;

/// Serves one MRIM client per connection: decodes frames, runs them through a [`Session`]
/// one at a time, and writes everything queued on the session's handle.
///
/// Reads are bounded by the handler's own idle timeout, not the accepting listener's.
pub struct MrimHandler {
    ctx: Arc<MrimContext>,
    max_payload: usize,
    idle_timeout: Duration,
}

impl MrimHandler {
    pub fn new(ctx: Arc<MrimContext>, max_payload: usize, idle_timeout: Duration) -> Self {
        Self {
            ctx,
            max_payload,
            idle_timeout,
        }
    }

    pub fn context(&self) -> &Arc<MrimContext> {
        &self.ctx
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: UnboundedReceiver<Outgoing>) {
    while let Some(item) = rx.recv().await {
        match item {
            Outgoing::Frame(frame) => {
                if let Err(e) = writer.write_all(&frame).await {
                    debug!(error = %e, "write failed, stopping writer");
                    break;
                }
            }
            Outgoing::Close => break,
        }
    }
    let _ = writer.shutdown().await;
}

fn log_rejection(rejection: &Rejection) {
    let error = &rejection.error;
    match error.kind() {
        ErrorKind::ProtocolViolation => {
            global_metrics().protocol_error();
            warn!(error = %error, "malformed command");
        }
        ErrorKind::Internal => warn!(error = %error, "command failed"),
        ErrorKind::UnsupportedOperation => info!(error = %error, "command refused"),
        ErrorKind::AuthenticationFailure | ErrorKind::RateLimited | ErrorKind::Transport => {
            debug!(error = %error, "command rejected")
        }
    }
}

/// Run one decoded packet through the session. Returns `true` when the connection must close.
async fn process(session: &mut Session, handle: &SessionHandle, packet: Packet) -> bool {
    global_metrics().packet_received(packet.payload.len() as u64);
    let span = debug_span!("command", name = command_name(packet.command()), seq = packet.seq());
    match session.dispatch(packet).instrument(span).await {
        Ok(()) => false,
        Err(rejection) => {
            log_rejection(&rejection);
            for frame in rejection.reply {
                handle.send(frame);
            }
            rejection.close
        }
    }
}

#[async_trait]
impl ConnectionHandler for MrimHandler {
    fn name(&self) -> &'static str {
        "mrim"
    }

    async fn handle(&self, conn: Connection) -> Result<()> {
        let Connection {
            id,
            stream,
            mut buffered,
            ..
        } = conn;
        let idle_timeout = self.idle_timeout;
        let (reader, writer) = stream.into_split();
        let (handle, rx) = SessionHandle::channel();
        let writer_task = tokio::spawn(write_loop(writer, rx).in_current_span());

        let mut session = Session::new(Arc::clone(&self.ctx), id, handle.clone());
        let mut codec = MrimCodec::new(self.max_payload);

        // Frames handed over with the connection go first; FramedRead reads the socket before its buffer.
        let early = loop {
            match codec.decode(&mut buffered) {
                Ok(Some(packet)) => {
                    if process(&mut session, &handle, packet).await {
                        break Some(Ok(()));
                    }
                }
                Ok(None) => break None,
                Err(e) => break Some(Err(e)),
            }
        };

        let result = match early {
            Some(done) => done,
            None => {
                let mut frames = FramedRead::new(reader, codec);
                frames.read_buffer_mut().extend_from_slice(&buffered);
                loop {
                    let packet = tokio::select! {
                        _ = handle.closed() => {
                            debug!("writer stopped, ending session");
                            break Ok(());
                        }
                        next = tokio::time::timeout(idle_timeout, frames.next()) => match next {
                            Err(_) => break Err(ProtocolError::ConnectionTimeout),
                            Ok(None) => break Ok(()),
                            Ok(Some(Err(e))) => break Err(e),
                            Ok(Some(Ok(packet))) => packet,
                        },
                    };
                    if process(&mut session, &handle, packet).await {
                        break Ok(());
                    }
                }
            }
        };

        session.close().await;
        handle.close();
        let _ = writer_task.await;
        result
    }
}
