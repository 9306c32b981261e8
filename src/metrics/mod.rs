//! Prometheus metrics for the transport service.
//!
//! Covers the queue substrate (enqueue, consume, redelivery, DLQ placement),
//! the transport step store (created steps, state transitions), and the two
//! delivery paths (push outcomes, pull downloads and acknowledgements).

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "relay";

lazy_static! {
    // ============================================================================
    // Queue Substrate Metrics
    // ============================================================================

    /// Total messages enqueued, by queue
    pub static ref QUEUE_ENQUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_enqueued_total", METRIC_PREFIX),
        "Total messages enqueued",
        &["queue"]
    ).unwrap();

    /// Total messages consumed and committed, by queue
    pub static ref QUEUE_CONSUMED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_consumed_total", METRIC_PREFIX),
        "Total messages consumed and committed",
        &["queue"]
    ).unwrap();

    /// Total redeliveries after a rolled back consume, by queue
    pub static ref QUEUE_REDELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_redelivered_total", METRIC_PREFIX),
        "Total message redeliveries",
        &["queue"]
    ).unwrap();

    /// Total messages moved to a dead letter queue, by origin queue
    pub static ref QUEUE_DEAD_LETTERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_dead_lettered_total", METRIC_PREFIX),
        "Total messages moved to the DLQ after exhausting redeliveries",
        &["queue"]
    ).unwrap();

    // ============================================================================
    // Transport Step Metrics
    // ============================================================================

    /// Total transport steps created
    pub static ref TRANSPORT_STEPS_CREATED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_transport_steps_created_total", METRIC_PREFIX),
        "Total transport steps created"
    ).unwrap();

    /// Total applied state transitions, by resulting state
    pub static ref TRANSPORT_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_transport_transitions_total", METRIC_PREFIX),
        "Total transport step state transitions",
        &["state"]
    ).unwrap();

    /// Total rejected transitions (terminal step or illegal move)
    pub static ref TRANSPORT_TRANSITIONS_REJECTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_transport_transitions_rejected_total", METRIC_PREFIX),
        "Total rejected transport step transitions"
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Push delivery outcomes
    pub static ref PUSH_DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_push_deliveries_total", METRIC_PREFIX),
        "Total push delivery attempts",
        &["outcome"]
    ).unwrap();

    /// Payload downloads over the pull endpoint
    pub static ref PULL_DOWNLOADS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_pull_downloads_total", METRIC_PREFIX),
        "Total payload downloads over the pull endpoint"
    ).unwrap();

    /// Acknowledgements received over the pull endpoint
    pub static ref PULL_ACKNOWLEDGEMENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_pull_acknowledgements_total", METRIC_PREFIX),
        "Total acknowledgements received over the pull endpoint",
        &["outcome"]
    ).unwrap();

    /// Messages submitted inbound by a link partner
    pub static ref INBOUND_SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_inbound_submissions_total", METRIC_PREFIX),
        "Total inbound message submissions",
        &["outcome"]
    ).unwrap();
}

/// Render all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_contains_prefix() {
        QUEUE_ENQUEUED_TOTAL.with_label_values(&["to-link"]).inc();
        let rendered = encode_metrics().unwrap();
        assert!(rendered.contains("relay_queue_enqueued_total"));
    }
}
