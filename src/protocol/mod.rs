//! # MRIM Protocol Layer
//!
//! Command codes, typed command payloads and the command dispatcher. The container header
//! and framing live in [`crate::core`].
//!
//! ## Components
//! - **Commands**: `MRIM_CS_*` codes and status constants
//! - **Messages**: schemas and typed structs for every payload the server reads or writes
//! - **Dispatcher**: command code to handler routing

pub mod commands;
pub mod dispatcher;
pub mod messages;

pub use dispatcher::{Dispatcher, HandlerFn, HandlerResult};
pub use messages::WireMessage;
