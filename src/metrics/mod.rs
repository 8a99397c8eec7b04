//! Prometheus collectors.
//!
//! The core only increments counters and observes durations; `/metrics`
//! renders [`REGISTRY`] in text exposition format.


use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;

lazy_static! {
    pub static ref REQUEST_COUNT: IntCounterVec = IntCounterVec::new(
        Opts::new("config_requests_total", "Total config requests"),
        &["method", "endpoint", "status"]
    )
    .expect("metric can not be created");

    pub static ref REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("config_request_duration_seconds", "Request duration"),
        &["endpoint"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("config_watch_events_total", "Backend change notifications dispatched"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref CALLBACK_FAILURES: IntCounter = IntCounter::new(
        "config_watch_callback_failures_total",
        "Watch callbacks that returned an error or panicked"
    )
    .expect("metric can not be created");

    pub static ref BROADCAST_FAILURES: IntCounter = IntCounter::new(
        "config_broadcast_failures_total",
        "Push sends that failed and dropped their connection"
    )
    .expect("metric can not be created");

    pub static ref REPLICATION_DURATION_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "config_replication_duration_ms",
            "Time for a write to become visible on one endpoint"
        )
        .buckets(exponential_buckets(1.0, 2.0, 14).expect("valid buckets")),
        &["endpoint", "ok"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

pub fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(REQUEST_COUNT.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(REQUEST_DURATION.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCH_EVENTS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CALLBACK_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BROADCAST_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(REPLICATION_DURATION_MS.clone()))
        .expect("collector can be registered");
}

/// Render every collector in [`REGISTRY`]
pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}

pub(crate) fn record_request(
    method: &str,
    endpoint: &str,
    status: &str,
) {
    REQUEST_COUNT.with_label_values(&[method, endpoint, status]).inc();
}
