use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::error;


lazy_static! {
    pub static ref POLL_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("lookup_poll_failures", "Failed poll cycles per kind and group"),
        &["kind", "group"]
    )
    .expect("metric can not be created");

    pub static ref CONVERSION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "lookup_conversion_failures",
            "Store instances skipped because their address could not be decoded"
        ),
        &["group"]
    )
    .expect("metric can not be created");

    pub static ref NOTIFICATIONS_DELIVERED: IntCounterVec = IntCounterVec::new(
        Opts::new("lookup_notifications_delivered", "Change notifications delivered"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref NOTIFICATIONS_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "lookup_notifications_dropped",
            "Change notifications dropped because the queue was full"
        ),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref HEARTBEAT_FAILURES: IntCounter = IntCounter::new(
        "lookup_heartbeat_failures",
        "Failed health acknowledgments"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(POLL_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CONVERSION_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(NOTIFICATIONS_DELIVERED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(NOTIFICATIONS_DROPPED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(HEARTBEAT_FAILURES.clone()))
        .expect("collector can be registered");
}

/// Renders the registry's metrics in Prometheus text format
pub fn gather_metrics_text() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode lookup metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("lookup metrics could not be from_utf8'd: {}", e);
        String::new()
    })
}
