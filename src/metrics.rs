//! Client-side counters for backend calls, realtime traffic and uploads
//!
//! Nothing is exported over HTTP; embedders gather `REGISTRY` themselves.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Backend Metrics
    pub static ref BACKEND_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("linkup_backend_requests_total", "Total number of backend requests"),
        &["method", "resource", "status"]
    ).expect("metric can be created");
    pub static ref BACKEND_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "linkup_backend_request_duration_seconds",
            "Backend request duration in seconds"
        ).buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["method", "resource"]
    ).expect("metric can be created");

    // Realtime Metrics
    pub static ref REALTIME_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("linkup_realtime_events_total", "Total number of change events received"),
        &["table", "kind"]
    ).expect("metric can be created");
    pub static ref REALTIME_SUBSCRIPTIONS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("linkup_realtime_subscriptions", "Current number of open change subscriptions"),
        &["table"]
    ).expect("metric can be created");

    // Storage Metrics
    pub static ref MEDIA_UPLOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("linkup_media_uploads_total", "Total number of media uploads"),
        &["kind"]
    ).expect("metric can be created");
    pub static ref MEDIA_BYTES_UPLOADED: IntCounter = IntCounter::new(
        "linkup_media_bytes_uploaded_total",
        "Total bytes of media uploaded"
    ).expect("metric can be created");

    // Feed Metrics
    pub static ref FEED_ITEMS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("linkup_feed_items", "Posts currently held by a feed"),
        &["feed"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("linkup_errors_total", "Total number of errors at the data-access boundary"),
        &["error_type", "operation"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(BACKEND_REQUESTS_TOTAL.clone()))
        .expect("BACKEND_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(BACKEND_REQUEST_DURATION_SECONDS.clone()))
        .expect("BACKEND_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(REALTIME_EVENTS_TOTAL.clone()))
        .expect("REALTIME_EVENTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(REALTIME_SUBSCRIPTIONS.clone()))
        .expect("REALTIME_SUBSCRIPTIONS can be registered");
    REGISTRY
        .register(Box::new(MEDIA_UPLOADS_TOTAL.clone()))
        .expect("MEDIA_UPLOADS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(MEDIA_BYTES_UPLOADED.clone()))
        .expect("MEDIA_BYTES_UPLOADED can be registered");
    REGISTRY
        .register(Box::new(FEED_ITEMS.clone()))
        .expect("FEED_ITEMS can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

/// Render the registry in the Prometheus text format
pub fn gather_text() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(error) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(%error, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
