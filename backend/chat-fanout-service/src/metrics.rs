use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

static ACTIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "chat_fanout_active_sessions",
        "Authenticated WebSocket sessions currently registered",
    )
    .expect("failed to create chat_fanout_active_sessions");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register chat_fanout_active_sessions");
    gauge
});

static FRAMES_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "chat_fanout_frames_delivered_total",
        "Outbound frames handed to a live session",
    )
    .expect("failed to create chat_fanout_frames_delivered_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_fanout_frames_delivered_total");
    counter
});

static FRAMES_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "chat_fanout_frames_dropped_total",
        "Outbound frames dropped because the session was already closed",
    )
    .expect("failed to create chat_fanout_frames_dropped_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_fanout_frames_dropped_total");
    counter
});

static ENVELOPES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_fanout_envelopes_total",
            "Inbound envelopes handled by the router",
        ),
        &["operation"],
    )
    .expect("failed to create chat_fanout_envelopes_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_fanout_envelopes_total");
    counter
});

static ENVELOPES_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_fanout_envelopes_rejected_total",
            "Inbound envelopes answered with a private error notice",
        ),
        &["code"],
    )
    .expect("failed to create chat_fanout_envelopes_rejected_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_fanout_envelopes_rejected_total");
    counter
});

static REST_AUTH_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_fanout_rest_auth_rejected_total",
            "REST requests refused for a missing or invalid bearer token",
        ),
        &["reason"],
    )
    .expect("failed to create chat_fanout_rest_auth_rejected_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_fanout_rest_auth_rejected_total");
    counter
});

static HANDSHAKES_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_fanout_handshakes_rejected_total",
            "WebSocket handshakes refused before a session was created",
        ),
        &["reason"],
    )
    .expect("failed to create chat_fanout_handshakes_rejected_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_fanout_handshakes_rejected_total");
    counter
});

pub fn session_registered() {
    ACTIVE_SESSIONS.inc();
}

pub fn session_unregistered() {
    ACTIVE_SESSIONS.dec();
}

pub fn frames_delivered(count: usize) {
    FRAMES_DELIVERED.inc_by(count as u64);
}

pub fn frames_dropped(count: usize) {
    FRAMES_DROPPED.inc_by(count as u64);
}

pub fn envelope_handled(operation: &str) {
    ENVELOPES_TOTAL.with_label_values(&[operation]).inc();
}

pub fn envelope_rejected(code: &str) {
    ENVELOPES_REJECTED.with_label_values(&[code]).inc();
}

pub fn rest_auth_rejected(reason: &str) {
    REST_AUTH_REJECTED.with_label_values(&[reason]).inc();
}

pub fn handshake_rejected(reason: &str) {
    HANDSHAKES_REJECTED.with_label_values(&[reason]).inc();
}

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
