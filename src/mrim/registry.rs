//! Live-session registry.
//!
//! Maps authenticated users to the connection currently serving them, so that one session
//! can push frames (relayed messages, presence) to another. Pushes never touch the other
//! socket directly: each connection owns a single writer task and the registry only holds
//! the sending half of its queue ([`SessionHandle`]).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};

use crate::core::packet::ProtocolVersion;
use crate::engine::ConnectionId;

/// Work item for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Frame(Bytes),
    Close,
}

/// Sending half of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl SessionHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a frame. Returns `false` when the connection is already gone.
    pub fn send(&self, frame: Bytes) -> bool {
        self.tx.send(Outgoing::Frame(frame)).is_ok()
    }

    /// Ask the writer to flush what is queued and close the socket.
    pub fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the writer task has stopped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub user_id: u32,
    pub login: String,
    pub status: u32,
    pub version: ProtocolVersion,
    pub conn: ConnectionId,
    pub handle: SessionHandle,
}

#[derive(Debug, Default)]
struct Table {
    by_id: HashMap<u32, RegistryEntry>,
    by_login: HashMap<String, u32>,
}

fn login_key(login: &str) -> String {
    login.to_lowercase()
}

/// Shared, cheaply clonable registry.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    table: Arc<RwLock<Table>>,
    message_ids: Arc<AtomicU32>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Any previous session of the same user is returned; the caller is
    /// responsible for telling it to go away.
    pub async fn insert(&self, entry: RegistryEntry) -> Option<RegistryEntry> {
        let mut table = self.table.write().await;
        let displaced = table.by_id.remove(&entry.user_id);
        if let Some(old) = &displaced {
            table.by_login.remove(&login_key(&old.login));
        }
        table.by_login.insert(login_key(&entry.login), entry.user_id);
        table.by_id.insert(entry.user_id, entry);
        displaced
    }

    /// Remove the user's entry only if it still belongs to `conn`.
    pub async fn remove(&self, user_id: u32, conn: ConnectionId) -> Option<RegistryEntry> {
        let mut table = self.table.write().await;
        if table.by_id.get(&user_id).map(|e| e.conn) != Some(conn) {
            return None;
        }
        let entry = table.by_id.remove(&user_id)?;
        table.by_login.remove(&login_key(&entry.login));
        Some(entry)
    }

    pub async fn get(&self, user_id: u32) -> Option<RegistryEntry> {
        self.table.read().await.by_id.get(&user_id).cloned()
    }

    pub async fn lookup_login(&self, login: &str) -> Option<RegistryEntry> {
        let table = self.table.read().await;
        table
            .by_login
            .get(&login_key(login))
            .and_then(|id| table.by_id.get(id))
            .cloned()
    }

    /// Update the status of a live entry. Returns `false` if `conn` no longer owns it.
    pub async fn set_status(&self, user_id: u32, conn: ConnectionId, status: u32) -> bool {
        let mut table = self.table.write().await;
        match table.by_id.get_mut(&user_id) {
            Some(entry) if entry.conn == conn => {
                entry.status = status;
                true
            }
            _ => false,
        }
    }

    /// Entries for those of `logins` that are currently online.
    pub async fn online_among<'a, I>(&self, logins: I) -> Vec<RegistryEntry>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let table = self.table.read().await;
        logins
            .into_iter()
            .filter_map(|login| table.by_login.get(&login_key(login)))
            .filter_map(|id| table.by_id.get(id))
            .cloned()
            .collect()
    }

    /// Whether `conn` is still the registered session of `user_id`.
    pub async fn is_live(&self, user_id: u32, conn: ConnectionId) -> bool {
        self.table
            .read()
            .await
            .by_id
            .get(&user_id)
            .is_some_and(|e| e.conn == conn && !e.handle.is_closed())
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Process-wide id for relayed messages.
    pub fn next_message_id(&self) -> u32 {
        self.message_ids.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }
}
