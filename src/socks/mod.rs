//! # SOCKS5 Gateway
//!
//! Wire messages for the RFC 1928 negotiation and the step handler that authorizes a
//! CONNECT and splices the socket into the MRIM or redirector handler.

pub mod gateway;
pub mod messages;

pub use gateway::{gateway, SocksRoutes};
pub use messages::{Address, ConnectReply, ConnectRequest, Handshake, MethodSelection};
