//! Prometheus metrics collection for emberd.
//!
//! Tracks connection and room population, frame throughput, and the
//! broadcast fan-out distribution. Exposed on an HTTP endpoint for
//! scraping; recording is a no-op until [`init`] runs, so tests and
//! metrics-disabled deployments pay nothing.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Currently connected sessions.
pub static CONNECTED_SESSIONS: OnceLock<IntGauge> = OnceLock::new();

/// Rooms with at least one member.
pub static ACTIVE_ROOMS: OnceLock<IntGauge> = OnceLock::new();

/// Frames received by envelope kind.
pub static FRAMES_RECEIVED: OnceLock<IntCounterVec> = OnceLock::new();

/// Rejected frames by error code.
pub static FRAME_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Envelopes dropped because a member's send queue was full.
pub static SEND_QUEUE_DROPS: OnceLock<IntCounter> = OnceLock::new();

/// Recipients per chat broadcast.
pub static MESSAGE_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(
        CONNECTED_SESSIONS,
        IntGauge::new("ember_connected_sessions", "Currently connected sessions")
    );
    register!(
        ACTIVE_ROOMS,
        IntGauge::new("ember_active_rooms", "Rooms with at least one member")
    );
    register!(
        FRAMES_RECEIVED,
        IntCounterVec::new(
            Opts::new("ember_frames_received_total", "Frames received by kind"),
            &["kind"]
        )
    );
    register!(
        FRAME_ERRORS,
        IntCounterVec::new(
            Opts::new("ember_frame_errors_total", "Rejected frames by error code"),
            &["error"]
        )
    );
    register!(
        SEND_QUEUE_DROPS,
        IntCounter::new(
            "ember_send_queue_drops_total",
            "Envelopes dropped due to full send queues"
        )
    );
    register!(
        MESSAGE_FANOUT,
        Histogram::with_opts(
            HistogramOpts::new("ember_message_fanout", "Recipients per chat broadcast")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0])
        )
    );
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

#[inline]
pub fn set_connected_sessions(count: usize) {
    if let Some(g) = CONNECTED_SESSIONS.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn set_active_rooms(count: usize) {
    if let Some(g) = ACTIVE_ROOMS.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn record_frame(kind: &str) {
    if let Some(c) = FRAMES_RECEIVED.get() {
        c.with_label_values(&[kind]).inc();
    }
}

#[inline]
pub fn record_frame_error(error: &str) {
    if let Some(c) = FRAME_ERRORS.get() {
        c.with_label_values(&[error]).inc();
    }
}

#[inline]
pub fn record_send_drop() {
    if let Some(c) = SEND_QUEUE_DROPS.get() {
        c.inc();
    }
}

#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = MESSAGE_FANOUT.get() {
        h.observe(recipients as f64);
    }
}
