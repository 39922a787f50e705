//! # MRIM Gateway
//!
//! An MRIM instant-messaging server with an in-process SOCKS5 gateway in front of it.
//!
//! ## Layers
//! - **core**: endian-aware binary primitives, declarative message schemas, the 44-byte MRIM
//!   container and its framing codec
//! - **engine**: TCP listeners, per-connection handlers and the step-by-step adaptor
//! - **protocol**: MRIM command codes, typed payloads and the command dispatcher
//! - **mrim**: per-connection sessions, the live-session registry and the MRIM handler
//! - **socks**: SOCKS5 negotiation that splices accepted sockets into the MRIM server or the
//!   redirector
//! - **store**: the user-store interface and an in-memory implementation
//!
//! ## Listeners
//! ```text
//! :1080  SOCKS5 ──CONNECT :2041──> MRIM handler
//!               └─CONNECT :2042──> redirector
//! :2041  MRIM
//! :2042  redirector ("host:port")
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod mrim;
pub mod protocol;
pub mod redirector;
pub mod socks;
pub mod store;
pub mod utils;

pub use config::GatewayConfig;
pub use error::{ProtocolError, Result};
