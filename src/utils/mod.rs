//! # Utility Modules
//!
//! Supporting utilities for logging, timing and observability.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup driven by [`crate::config::LoggingConfig`]
//! - **Timeout**: default durations and async timeout wrappers
//! - **Metrics**: thread-safe observability counters

pub mod logging;
pub mod metrics;
pub mod timeout;
