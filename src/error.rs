//! # Error Types
//!
//! Error handling for the MRIM server and its SOCKS5 gateway.
//!
//! Every failure raised by the codec, the connection engine or a command handler is a
//! [`ProtocolError`]. Errors are grouped into a small taxonomy ([`ErrorKind`]) that the
//! connection engine uses to decide between replying, closing and merely logging.
//!
//! ## Error Categories
//! - **Protocol violations**: short buffers, bad magic, constant-field mismatch, bad lengths
//! - **Authentication failures**: unknown login or wrong password
//! - **Unsupported operations**: disallowed SOCKS commands/ports, commands before login
//! - **Rate limiting**: search quota exhausted
//! - **Internal**: collaborator (user store) failures and encoder misuse
//! - **Transport**: socket I/O, timeouts, closed connections
//!
//! ## Example Usage
//! ```rust
//! use mrim_gateway::error::{ErrorKind, ProtocolError};
//!
//! let err = ProtocolError::InvalidMagic(0x0BADF00D);
//! assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Store errors
    pub const ERR_STORE_UNAVAILABLE: &str = "User store unavailable";

    /// Session errors
    pub const ERR_NOT_AUTHENTICATED: &str = "Command requires an authenticated session";
    pub const ERR_ALREADY_AUTHENTICATED: &str = "Session is already authenticated";

    /// SOCKS errors
    pub const ERR_SOCKS_NO_ACCEPTABLE_METHOD: &str = "No acceptable SOCKS5 authentication method";
    pub const ERR_SOCKS_COMMAND: &str = "Only the SOCKS5 CONNECT command is supported";
    pub const ERR_SOCKS_PORT: &str = "Destination port is not allowed";
    pub const ERR_SOCKS_ADDRESS_TYPE: &str = "Unsupported SOCKS5 address type";

    /// Login rejection reasons sent to the client
    pub const LOGIN_REJ_INVALID: &str = "Invalid login";
    pub const LOGIN_REJ_INTERNAL: &str = "Database error";
}

/// Coarse classification used by the connection engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ProtocolViolation,
    AuthenticationFailure,
    UnsupportedOperation,
    RateLimited,
    Internal,
    Transport,
}

// ProtocolError is the primary error type for all gateway operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Read out of range at offset {offset}: needed {needed} bytes, {available} available")]
    OutOfRange {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Invalid magic: {0:#010x}")]
    InvalidMagic(u32),

    #[error("Constant field '{field}' mismatch: expected {expected}, found {found}")]
    ConstantMismatch {
        field: &'static str,
        expected: i64,
        found: i64,
    },

    #[error("Declared payload length {declared} exceeds the {available} bytes available")]
    LengthMismatch { declared: usize, available: usize },

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Protocol violation: {0}")]
    Violation(String),

    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    #[error("Field '{field}' expects a {expected} value")]
    FieldType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Authentication failed")]
    AuthenticationFailure,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Connection timed out (no activity)")]
    ConnectionTimeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Classify the error for the engine's reply/close/log decision.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::OutOfRange { .. }
            | ProtocolError::InvalidMagic(_)
            | ProtocolError::ConstantMismatch { .. }
            | ProtocolError::LengthMismatch { .. }
            | ProtocolError::OversizedPacket(_)
            | ProtocolError::Violation(_) => ErrorKind::ProtocolViolation,
            ProtocolError::AuthenticationFailure => ErrorKind::AuthenticationFailure,
            ProtocolError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            ProtocolError::RateLimited => ErrorKind::RateLimited,
            ProtocolError::MissingField(_)
            | ProtocolError::FieldType { .. }
            | ProtocolError::Internal(_)
            | ProtocolError::ConfigError(_) => ErrorKind::Internal,
            ProtocolError::Io(_)
            | ProtocolError::ConnectionClosed
            | ProtocolError::Timeout
            | ProtocolError::ConnectionTimeout => ErrorKind::Transport,
        }
    }

    /// True when more input could turn this error into a successful decode.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtocolError::OutOfRange { .. })
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
