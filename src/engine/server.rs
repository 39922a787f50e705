//! TCP listener that runs one [`ConnectionHandler`] task per accepted socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::engine::connection::{Connection, ConnectionHandler};
use crate::error::{ErrorKind, Result};
use crate::utils::metrics::global_metrics;

/// Per-listener resource limits.
#[derive(Debug, Clone, Copy)]
pub struct ServerLimits {
    pub max_connections: usize,
    pub idle_timeout: Duration,
    pub shutdown_timeout: Duration,
}

pub struct Server {
    name: &'static str,
    listener: TcpListener,
    handler: Arc<dyn ConnectionHandler>,
    limits: ServerLimits,
    active: Arc<AtomicUsize>,
}

impl Server {
    pub async fn bind(
        name: &'static str,
        address: &str,
        handler: Arc<dyn ConnectionHandler>,
        limits: ServerLimits,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        info!(server = name, address = %listener.local_addr()?, handler = handler.name(), "Listening");
        Ok(Self {
            name,
            listener,
            handler,
            limits,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until `shutdown_rx` fires, then wait up to the shutdown timeout for open
    /// connections to finish.
    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(server = self.name, "Shutting down server. Waiting for connections to close...");

                    let timeout = tokio::time::sleep(self.limits.shutdown_timeout);
                    tokio::pin!(timeout);

                    loop {
                        let connections = self.active.load(Ordering::SeqCst);
                        if connections == 0 {
                            info!(server = self.name, "All connections closed, shutting down");
                            break;
                        }
                        tokio::select! {
                            _ = &mut timeout => {
                                warn!(server = self.name, connections, "Shutdown timeout reached, forcing exit");
                                break;
                            }
                            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                                debug!(server = self.name, connections, "Waiting for connections to close");
                            }
                        }
                    }

                    return Ok(());
                }

                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(e) => error!(server = self.name, error = %e, "Error accepting connection"),
                    }
                }
            }
        }
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let metrics = global_metrics();
        if self.active.load(Ordering::SeqCst) >= self.limits.max_connections {
            metrics.connection_rejected();
            warn!(server = self.name, peer = %peer, "Connection limit reached, dropping connection");
            return;
        }

        let conn = Connection::new(stream, peer, self.limits.idle_timeout);
        let span = info_span!("conn", server = self.name, conn_id = %conn.id, peer = %peer);
        let handler = Arc::clone(&self.handler);
        let active = Arc::clone(&self.active);

        active.fetch_add(1, Ordering::SeqCst);
        metrics.connection_established();

        tokio::spawn(
            async move {
                debug!("Connection accepted");
                match handler.handle(conn).await {
                    Ok(()) => debug!("Connection closed"),
                    Err(e) if e.kind() == ErrorKind::Transport => {
                        debug!(error = %e, "Connection ended")
                    }
                    Err(e) => {
                        metrics.protocol_error();
                        warn!(error = %e, "Connection failed");
                    }
                }
                active.fetch_sub(1, Ordering::SeqCst);
                metrics.connection_closed();
            }
            .instrument(span),
        );
    }
}
