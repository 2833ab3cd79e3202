//! Prometheus metrics for the client-fleet control plane.
//!
//! No HTTP exposition endpoint is wired up here — the API surface that would
//! scrape `/metrics` is out of scope (spec.md §1 non-goals don't name
//! metrics explicitly, but the core's job is to maintain these counters and
//! gauges, not serve them).

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Gauges (ClientStore lifecycle, spec.md §4.2)
    pub static ref CLIENTS_ACTIVE: IntGauge = IntGauge::new(
        "rportd_clients_active",
        "Clients with a live session"
    ).unwrap();

    pub static ref CLIENTS_DISCONNECTED: IntGauge = IntGauge::new(
        "rportd_clients_disconnected",
        "Clients disconnected but within the retention window"
    ).unwrap();

    pub static ref CLIENTS_OBSOLETE_REAPED: IntCounter = IntCounter::new(
        "rportd_clients_obsolete_reaped_total",
        "Clients deleted by the reaper as obsolete"
    ).unwrap();

    pub static ref DISPATCHES_IN_FLIGHT: IntGauge = IntGauge::new(
        "rportd_dispatches_in_flight",
        "Jobs currently dispatched and awaiting a terminal state"
    ).unwrap();

    // Counters (Dispatcher outcomes, spec.md §4.6)
    pub static ref JOBS_DISPATCHED: IntCounter = IntCounter::new(
        "rportd_jobs_dispatched_total",
        "Jobs dispatched to a client"
    ).unwrap();

    pub static ref JOBS_SUCCEEDED: IntCounter = IntCounter::new(
        "rportd_jobs_succeeded_total",
        "Jobs that completed successfully"
    ).unwrap();

    pub static ref JOBS_FAILED: IntCounter = IntCounter::new(
        "rportd_jobs_failed_total",
        "Jobs that completed with a failure (including offline clients)"
    ).unwrap();

    pub static ref JOBS_TIMED_OUT: IntCounter = IntCounter::new(
        "rportd_jobs_timed_out_total",
        "Jobs that ended in status unknown (timeout or cancellation)"
    ).unwrap();
}

/// Register every metric. Call once at startup before any are recorded.
pub fn init() {
    REGISTRY.register(Box::new(CLIENTS_ACTIVE.clone())).unwrap();
    REGISTRY.register(Box::new(CLIENTS_DISCONNECTED.clone())).unwrap();
    REGISTRY.register(Box::new(CLIENTS_OBSOLETE_REAPED.clone())).unwrap();
    REGISTRY.register(Box::new(DISPATCHES_IN_FLIGHT.clone())).unwrap();
    REGISTRY.register(Box::new(JOBS_DISPATCHED.clone())).unwrap();
    REGISTRY.register(Box::new(JOBS_SUCCEEDED.clone())).unwrap();
    REGISTRY.register(Box::new(JOBS_FAILED.clone())).unwrap();
    REGISTRY.register(Box::new(JOBS_TIMED_OUT.clone())).unwrap();
}

/// Gather all metrics and encode them in Prometheus text format. No endpoint
/// serves this in-process; it exists for an embedding binary to expose.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
