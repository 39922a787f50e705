//! # MRIM Server
//!
//! Session state machine, live-session registry and the connection handler that drives them.
//!
//! ## Flow
//! ```text
//! socket -> MrimCodec -> Session::dispatch -> command handler -> SessionHandle -> writer task
//!                                      \-> Registry -> other sessions' SessionHandle
//! ```

pub mod handler;
pub mod rate_limit;
pub mod registry;
pub mod session;

use std::sync::Arc;

use crate::config::MrimConfig;
use crate::protocol::Dispatcher;
use crate::store::UserStore;

pub use handler::MrimHandler;
pub use registry::{Outgoing, Registry, RegistryEntry, SessionHandle};
pub use session::{Identity, Session, SessionState};

/// Everything a session shares with every other session.
pub struct MrimContext {
    pub registry: Registry,
    pub store: Arc<dyn UserStore>,
    pub dispatcher: Dispatcher<Session>,
    pub config: MrimConfig,
}

impl MrimContext {
    pub fn new(store: Arc<dyn UserStore>, config: MrimConfig) -> Arc<Self> {
        Arc::new(Self {
            registry: Registry::new(),
            store,
            dispatcher: session::routes(),
            config,
        })
    }
}
