use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

fn register<C: prometheus::core::Collector + Clone + 'static>(collector: C, name: &str) -> C {
    if let Err(e) = prometheus::default_registry().register(Box::new(collector.clone())) {
        tracing::warn!(metric = name, error = %e, "metric registration failed");
    }
    collector
}

static MESSAGES_SENT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new("chat_messages_sent_total", "Messages persisted by the chat core")
            .expect("failed to create chat_messages_sent_total"),
        "chat_messages_sent_total",
    )
});

static CONVERSATIONS_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new(
            "chat_conversations_created_total",
            "Direct conversations created on first contact",
        )
        .expect("failed to create chat_conversations_created_total"),
        "chat_conversations_created_total",
    )
});

static MESSAGES_MARKED_SEEN_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new(
            "chat_messages_marked_seen_total",
            "Messages flipped to seen by a counterpart fetch",
        )
        .expect("failed to create chat_messages_marked_seen_total"),
        "chat_messages_marked_seen_total",
    )
});

static DELIVERY_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register(
        IntCounterVec::new(
            Opts::new(
                "chat_delivery_failures_total",
                "Delivery bus publishes that failed and were swallowed",
            ),
            &["event"],
        )
        .expect("failed to create chat_delivery_failures_total"),
        "chat_delivery_failures_total",
    )
});

static WS_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register(
        IntGauge::new("chat_ws_connections", "Open WebSocket connections on this instance")
            .expect("failed to create chat_ws_connections"),
        "chat_ws_connections",
    )
});

pub fn record_message_sent() {
    MESSAGES_SENT_TOTAL.inc();
}

pub fn record_conversation_created() {
    CONVERSATIONS_CREATED_TOTAL.inc();
}

pub fn record_messages_seen(count: u64) {
    MESSAGES_MARKED_SEEN_TOTAL.inc_by(count);
}

pub fn record_delivery_failure(event: &str) {
    DELIVERY_FAILURES_TOTAL.with_label_values(&[event]).inc();
}

pub fn ws_connected() {
    WS_CONNECTIONS.inc();
}

pub fn ws_disconnected() {
    WS_CONNECTIONS.dec();
}

pub async fn serve_metrics() -> HttpResponse {
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
