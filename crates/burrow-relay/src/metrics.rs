//! Relay metrics for observability.
//!
//! Uses the global OpenTelemetry meter provider, which must be initialized
//! by the host application (burrow-server). Without an installed provider
//! every recording call is a no-op.

use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

static METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    METER.get_or_init(|| opentelemetry::global::meter("burrow-relay"))
}

// ============================================================================
// Counters (Cumulative)
// ============================================================================

/// Counter for messages dispatched.
pub fn messages_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("relay.messages.dispatched")
        .with_description("Total inbound messages dispatched")
        .with_unit("message")
        .build()
}

/// Counter for frames skipped because they failed to decode.
pub fn frames_rejected() -> Counter<u64> {
    meter()
        .u64_counter("relay.frames.rejected")
        .with_description("Total inbound frames dropped as undecodable")
        .with_unit("frame")
        .build()
}

// ============================================================================
// Gauges (Current State)
// ============================================================================

/// Gauge for active connections.
pub fn connections_active() -> Gauge<i64> {
    meter()
        .i64_gauge("relay.connections.active")
        .with_description("Current number of registered connections")
        .with_unit("connection")
        .build()
}

/// Gauge for rooms.
pub fn rooms_active() -> Gauge<i64> {
    meter()
        .i64_gauge("relay.rooms.active")
        .with_description("Current number of rooms")
        .with_unit("room")
        .build()
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Record a dispatched message with its kind and outcome.
pub fn record_dispatch(kind: &str, outcome: &str) {
    messages_dispatched().add(
        1,
        &[
            KeyValue::new("kind", kind.to_string()),
            KeyValue::new("outcome", outcome.to_string()),
        ],
    );
}

/// Record a frame dropped as undecodable.
pub fn record_rejected_frame() {
    frames_rejected().add(1, &[]);
}

/// Record connection count change.
pub fn record_connection_count(count: i64) {
    connections_active().record(count, &[]);
}

/// Record room count change.
pub fn record_room_count(count: i64) {
    rooms_active().record(count, &[]);
}
