//! Prometheus metrics for the relay service.
//!
//! Covers the three surfaces that matter operationally:
//! - session metrics (live sessions, registry occupancy, connection churn)
//! - delivery metrics (broadcast/unicast outcomes, evictions, dropped notices)
//! - detector metrics (decode outcomes and latency)

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "scan_relay";

lazy_static! {
    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Distinct open sessions (after implicit cleanup)
    pub static ref SESSIONS_LIVE: IntGauge = register_int_gauge!(
        format!("{}_sessions_live", METRIC_PREFIX),
        "Number of distinct open WebSocket sessions"
    ).unwrap();

    /// Raw registry table size (alias entries count separately)
    pub static ref REGISTRY_ENTRIES: IntGauge = register_int_gauge!(
        format!("{}_registry_entries", METRIC_PREFIX),
        "Raw registry table size including alias entries"
    ).unwrap();

    /// Total WebSocket connections opened
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    /// Total WebSocket connections closed
    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Connection duration in seconds
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0, 21600.0]
    ).unwrap();

    /// Inbound chat messages received from clients
    pub static ref WS_MESSAGES_RECEIVED: IntCounter = register_int_counter!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Total text messages received from WebSocket clients"
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Broadcast passes executed
    pub static ref BROADCASTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcasts_total", METRIC_PREFIX),
        "Total broadcast passes executed"
    ).unwrap();

    /// Messages delivered, by path (broadcast / unicast)
    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Messages successfully delivered to sessions",
        &["path"]
    ).unwrap();

    /// Failed deliveries, by path (broadcast / unicast)
    pub static ref MESSAGES_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_failed_total", METRIC_PREFIX),
        "Message deliveries that failed",
        &["path"]
    ).unwrap();

    /// Notices dropped because the notice queue was full
    pub static ref NOTICES_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notices_dropped_total", METRIC_PREFIX),
        "Hub notices dropped due to a full notice queue"
    ).unwrap();

    // ============================================================================
    // Detector Metrics
    // ============================================================================

    /// Decode attempts by outcome (decoded / not_found / error)
    pub static ref DETECTOR_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_detector_requests_total", METRIC_PREFIX),
        "Decode attempts by outcome",
        &["outcome"]
    ).unwrap();

    /// Decode latency in seconds, by backend
    pub static ref DETECTOR_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_detector_latency_seconds", METRIC_PREFIX),
        "Decode call latency in seconds",
        &["backend"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ).unwrap();
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record the outcome of one broadcast pass
    pub fn record_broadcast(delivered: u64, failed: u64) {
        BROADCASTS_TOTAL.inc();
        MESSAGES_DELIVERED_TOTAL
            .with_label_values(&["broadcast"])
            .inc_by(delivered);
        MESSAGES_FAILED_TOTAL
            .with_label_values(&["broadcast"])
            .inc_by(failed);
    }

    /// Record the outcome of one unicast send
    pub fn record_unicast(delivered: bool) {
        if delivered {
            MESSAGES_DELIVERED_TOTAL.with_label_values(&["unicast"]).inc();
        } else {
            MESSAGES_FAILED_TOTAL.with_label_values(&["unicast"]).inc();
        }
    }

    /// Record a notice dropped because the queue was full
    pub fn record_notice_dropped() {
        NOTICES_DROPPED_TOTAL.inc();
    }
}

/// Helper struct for recording session lifecycle metrics
pub struct SessionMetrics;

impl SessionMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
    }

    pub fn record_closed(duration_secs: f64) {
        WS_CONNECTIONS_CLOSED.inc();
        WS_CONNECTION_DURATION.observe(duration_secs);
    }

    pub fn record_message_received() {
        WS_MESSAGES_RECEIVED.inc();
    }
}

/// Helper struct for recording detector metrics
pub struct DetectorMetrics;

impl DetectorMetrics {
    pub fn record_decoded(backend: &str, latency_secs: f64) {
        DETECTOR_REQUESTS_TOTAL.with_label_values(&["decoded"]).inc();
        DETECTOR_LATENCY
            .with_label_values(&[backend])
            .observe(latency_secs);
    }

    pub fn record_not_found(backend: &str, latency_secs: f64) {
        DETECTOR_REQUESTS_TOTAL
            .with_label_values(&["not_found"])
            .inc();
        DETECTOR_LATENCY
            .with_label_values(&[backend])
            .observe(latency_secs);
    }

    pub fn record_error() {
        DETECTOR_REQUESTS_TOTAL.with_label_values(&["error"]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics() {
        SessionMetrics::record_opened();
        DeliveryMetrics::record_broadcast(2, 1);

        let output = encode_metrics().unwrap();
        assert!(output.contains("scan_relay_ws_connections_opened_total"));
        assert!(output.contains("scan_relay_broadcasts_total"));
    }

    #[test]
    fn test_unicast_outcomes_use_distinct_counters() {
        let delivered_before = MESSAGES_DELIVERED_TOTAL
            .with_label_values(&["unicast"])
            .get();
        let failed_before = MESSAGES_FAILED_TOTAL.with_label_values(&["unicast"]).get();

        DeliveryMetrics::record_unicast(true);
        DeliveryMetrics::record_unicast(false);

        assert_eq!(
            MESSAGES_DELIVERED_TOTAL
                .with_label_values(&["unicast"])
                .get(),
            delivered_before + 1
        );
        assert_eq!(
            MESSAGES_FAILED_TOTAL.with_label_values(&["unicast"]).get(),
            failed_before + 1
        );
    }
}
