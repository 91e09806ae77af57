//! Process-wide prometheus collectors for the notification pipeline.
//!
//! Collectors are registered once into a private [`struct@REGISTRY`]; the
//! embedding server exposes [`gather_metrics`] on whatever endpoint it owns.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;

lazy_static! {
    pub static ref SCANNED_RELEASES: IntCounterVec = IntCounterVec::new(
        Opts::new("scanned_releases_total", "Releases read by the scanner"),
        &["phase"]
    )
    .expect("metric can not be created");

    pub static ref RELEASE_EVENTS_PUBLISHED: IntCounter = IntCounter::new(
        "release_events_published_total",
        "Live release change events published on the event bus"
    )
    .expect("metric can not be created");

    pub static ref SCAN_FAILURES: IntCounter = IntCounter::new(
        "scan_failures_total",
        "Scans aborted by a store error"
    )
    .expect("metric can not be created");

    pub static ref DISPATCH_DROPPED_EVENTS: IntCounter = IntCounter::new(
        "dispatch_dropped_events_total",
        "Release events dropped because a dispatch queue was full"
    )
    .expect("metric can not be created");

    pub static ref CALLBACK_PANICS: IntCounterVec = IntCounterVec::new(
        Opts::new("callback_panics_total", "Panics caught at a dispatch boundary"),
        &["site"]
    )
    .expect("metric can not be created");

    pub static ref NOTIFICATIONS_DELIVERED: IntCounter = IntCounter::new(
        "notifications_delivered_total",
        "Delivery callbacks invoked after passing the version gate"
    )
    .expect("metric can not be created");

    pub static ref OPEN_SESSIONS: IntGauge =
        IntGauge::new("open_sessions", "Long-poll sessions currently open")
            .expect("metric can not be created");

    pub static ref SESSION_RESOLUTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("session_resolutions_total", "Long-poll sessions torn down, by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

fn register_custom_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(SCANNED_RELEASES.clone()),
            Box::new(RELEASE_EVENTS_PUBLISHED.clone()),
            Box::new(SCAN_FAILURES.clone()),
            Box::new(DISPATCH_DROPPED_EVENTS.clone()),
            Box::new(CALLBACK_PANICS.clone()),
            Box::new(NOTIFICATIONS_DELIVERED.clone()),
            Box::new(OPEN_SESSIONS.clone()),
            Box::new(SESSION_RESOLUTIONS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                error!("collector can not be registered: {:?}", e);
            }
        }
    });
}

/// Renders every collector in the prometheus text exposition format.
pub fn gather_metrics() -> String {
    register_custom_metrics();

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {:?}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
