//! # Connection Engine
//!
//! Accepts sockets and runs a handler per connection in one of two modes:
//!
//! - **Single**: a [`ConnectionHandler`] owns the socket for its whole life
//! - **Step-by-step**: [`StepByStep`] feeds an ordered chain of [`Step`]s from a per-connection
//!   framing buffer and can hand the bare connection to another handler when done
//!
//! Every connection gets a random [`ConnectionId`] that is attached to its tracing span.

pub mod connection;
pub mod server;
pub mod step;

pub use connection::{Connection, ConnectionHandler, ConnectionId};
pub use server::{Server, ServerLimits};
pub use step::{Rejection, Step, StepByStep, StepOutcome};
