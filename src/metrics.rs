//! Prometheus metrics for the coordinator.
//!
//! The coordinator only records; HTTP exposition belongs to the embedding
//! service. Call [`init`] once at startup, then [`gather_metrics`] from
//! whatever endpoint the embedder owns.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all coordinator metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Commands processed, by operation.
pub static COMMANDS: OnceLock<IntCounterVec> = OnceLock::new();

/// Rejected commands, by operation and error code.
pub static REJECTIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Matches made, by request kind (random/direct).
pub static MATCHES: OnceLock<IntCounterVec> = OnceLock::new();

/// Sessions ended, by reason (ended/disconnected).
pub static SESSIONS_ENDED: OnceLock<IntCounterVec> = OnceLock::new();

/// Requests that expired without resolution.
pub static REQUESTS_EXPIRED: OnceLock<IntCounter> = OnceLock::new();

/// Events dropped because a connection's channel was full or gone.
pub static EVENTS_DROPPED: OnceLock<IntCounter> = OnceLock::new();

/// Persistence writes that exhausted their retries.
pub static PERSISTENCE_FAILURES: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Currently connected users.
pub static CONNECTED_USERS: OnceLock<IntGauge> = OnceLock::new();

/// Users currently available for matching.
pub static AVAILABLE_USERS: OnceLock<IntGauge> = OnceLock::new();

/// Pending match requests in the ledger.
pub static ACTIVE_REQUESTS: OnceLock<IntGauge> = OnceLock::new();

/// Sessions not yet ended.
pub static ACTIVE_SESSIONS: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(COMMANDS, IntCounterVec::new(Opts::new("tandem_commands_total", "Commands processed by operation"), &["op"]));
    register!(REJECTIONS, IntCounterVec::new(Opts::new("tandem_rejections_total", "Rejected commands by operation and code"), &["op", "code"]));
    register!(MATCHES, IntCounterVec::new(Opts::new("tandem_matches_total", "Matches made by request kind"), &["kind"]));
    register!(SESSIONS_ENDED, IntCounterVec::new(Opts::new("tandem_sessions_ended_total", "Sessions ended by reason"), &["reason"]));
    register!(REQUESTS_EXPIRED, IntCounter::new("tandem_requests_expired_total", "Requests expired without resolution"));
    register!(EVENTS_DROPPED, IntCounter::new("tandem_events_dropped_total", "Outbound events dropped"));
    register!(PERSISTENCE_FAILURES, IntCounter::new("tandem_persistence_failures_total", "Persistence writes that exhausted retries"));
    register!(CONNECTED_USERS, IntGauge::new("tandem_connected_users", "Currently connected users"));
    register!(AVAILABLE_USERS, IntGauge::new("tandem_available_users", "Users available for matching"));
    register!(ACTIVE_REQUESTS, IntGauge::new("tandem_active_requests", "Pending match requests"));
    register!(ACTIVE_SESSIONS, IntGauge::new("tandem_active_sessions", "Sessions not yet ended"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

/// Record a processed command.
#[inline]
pub fn record_command(op: &str) {
    if let Some(c) = COMMANDS.get() {
        c.with_label_values(&[op]).inc();
    }
}

/// Record a rejected command.
#[inline]
pub fn record_rejection(op: &str, code: &str) {
    if let Some(c) = REJECTIONS.get() {
        c.with_label_values(&[op, code]).inc();
    }
}

/// Record a match by kind ("random" or "direct").
#[inline]
pub fn record_match(kind: &str) {
    if let Some(c) = MATCHES.get() {
        c.with_label_values(&[kind]).inc();
    }
}

/// Record a session end by reason ("ended" or "disconnected").
#[inline]
pub fn record_session_end(reason: &str) {
    if let Some(c) = SESSIONS_ENDED.get() {
        c.with_label_values(&[reason]).inc();
    }
}

/// Record an expired request.
#[inline]
pub fn record_request_expired() {
    if let Some(c) = REQUESTS_EXPIRED.get() {
        c.inc();
    }
}

/// Record a dropped outbound event.
#[inline]
pub fn record_event_dropped() {
    if let Some(c) = EVENTS_DROPPED.get() {
        c.inc();
    }
}

/// Record a persistence write that exhausted its retries.
#[inline]
pub fn record_persistence_failure() {
    if let Some(c) = PERSISTENCE_FAILURES.get() {
        c.inc();
    }
}

/// Adjust the connected-users gauge.
#[inline]
pub fn add_connected(delta: i64) {
    if let Some(g) = CONNECTED_USERS.get() {
        g.add(delta);
    }
}

/// Adjust the available-users gauge.
#[inline]
pub fn add_available(delta: i64) {
    if let Some(g) = AVAILABLE_USERS.get() {
        g.add(delta);
    }
}

/// Adjust the pending-requests gauge.
#[inline]
pub fn add_requests(delta: i64) {
    if let Some(g) = ACTIVE_REQUESTS.get() {
        g.add(delta);
    }
}

/// Adjust the active-sessions gauge.
#[inline]
pub fn add_sessions(delta: i64) {
    if let Some(g) = ACTIVE_SESSIONS.get() {
        g.add(delta);
    }
}
