//! Observability and Metrics
//!
//! Process-wide counters for the MRIM server and the SOCKS5 gateway.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Global metrics collector
#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted across all listeners
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Connections refused because the listener was at capacity
    pub connections_rejected: AtomicU64,
    /// MRIM packets decoded
    pub packets_received: AtomicU64,
    /// MRIM payload bytes decoded
    pub bytes_received: AtomicU64,
    /// Successful logins
    pub logins_success: AtomicU64,
    /// Rejected logins
    pub logins_failed: AtomicU64,
    /// Sessions closed because the same user logged in elsewhere
    pub sessions_displaced: AtomicU64,
    /// Messages relayed to an online recipient
    pub messages_relayed: AtomicU64,
    /// Messages refused because the recipient was offline
    pub messages_undeliverable: AtomicU64,
    /// Directory searches served
    pub searches_total: AtomicU64,
    /// Directory searches refused by the per-session limiter
    pub searches_rate_limited: AtomicU64,
    /// SOCKS connections handed to an in-process handler
    pub socks_handoffs: AtomicU64,
    /// SOCKS connections refused (method, command, port or address type)
    pub socks_refused: AtomicU64,
    /// Protocol errors
    pub protocol_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            logins_success: AtomicU64::new(0),
            logins_failed: AtomicU64::new(0),
            sessions_displaced: AtomicU64::new(0),
            messages_relayed: AtomicU64::new(0),
            messages_undeliverable: AtomicU64::new(0),
            searches_total: AtomicU64::new(0),
            searches_rate_limited: AtomicU64::new(0),
            socks_handoffs: AtomicU64::new(0),
            socks_refused: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decoded MRIM packet
    pub fn packet_received(&self, payload_len: u64) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(payload_len, Ordering::Relaxed);
    }

    pub fn login_success(&self) {
        self.logins_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn login_failed(&self) {
        self.logins_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_displaced(&self) {
        self.sessions_displaced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_relayed(&self) {
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_undeliverable(&self) {
        self.messages_undeliverable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn search(&self) {
        self.searches_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn search_rate_limited(&self) {
        self.searches_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn socks_handoff(&self) {
        self.socks_handoffs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn socks_refused(&self) {
        self.socks_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            logins_success: self.logins_success.load(Ordering::Relaxed),
            logins_failed: self.logins_failed.load(Ordering::Relaxed),
            sessions_displaced: self.sessions_displaced.load(Ordering::Relaxed),
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            messages_undeliverable: self.messages_undeliverable.load(Ordering::Relaxed),
            searches_total: self.searches_total.load(Ordering::Relaxed),
            searches_rate_limited: self.searches_rate_limited.load(Ordering::Relaxed),
            socks_handoffs: self.socks_handoffs.load(Ordering::Relaxed),
            socks_refused: self.socks_refused.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connections_rejected = snapshot.connections_rejected,
            packets_received = snapshot.packets_received,
            bytes_received = snapshot.bytes_received,
            logins_success = snapshot.logins_success,
            logins_failed = snapshot.logins_failed,
            sessions_displaced = snapshot.sessions_displaced,
            messages_relayed = snapshot.messages_relayed,
            messages_undeliverable = snapshot.messages_undeliverable,
            searches_total = snapshot.searches_total,
            searches_rate_limited = snapshot.searches_rate_limited,
            socks_handoffs = snapshot.socks_handoffs,
            socks_refused = snapshot.socks_refused,
            protocol_errors = snapshot.protocol_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Gateway metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub logins_success: u64,
    pub logins_failed: u64,
    pub sessions_displaced: u64,
    pub messages_relayed: u64,
    pub messages_undeliverable: u64,
    pub searches_total: u64,
    pub searches_rate_limited: u64,
    pub socks_handoffs: u64,
    pub socks_refused: u64,
    pub protocol_errors: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Initialize metrics collection (call once at startup)
pub fn init_metrics() {
    let _ = global_metrics();
    info!("Metrics collection initialized");
}

/// Logs the elapsed time of a store round-trip when dropped
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!(
            operation = self.operation,
            duration_ms = self.start.elapsed().as_millis() as u64,
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let metrics = Metrics::new();
        metrics.connection_established();
        metrics.connection_established();
        metrics.connection_closed();
        metrics.packet_received(12);
        metrics.search_rate_limited();

        let snap = metrics.snapshot();
        assert_eq!(snap.connections_total, 2);
        assert_eq!(snap.connections_active, 1);
        assert_eq!(snap.packets_received, 1);
        assert_eq!(snap.bytes_received, 12);
        assert_eq!(snap.searches_rate_limited, 1);
    }
}
