use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_placed_total: IntCounter,
    pub order_transitions_total: IntCounterVec,
    pub assignment_attempts_total: IntCounterVec,
    pub payments_settled_total: IntCounterVec,
    pub events_published_total: IntCounterVec,
    pub ws_connections: IntGauge,
    pub match_queue_depth: IntGauge,
    pub match_latency_seconds: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_placed_total = IntCounter::new("orders_placed_total", "Orders placed")
            .expect("valid orders_placed_total metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order status transitions by target status"),
            &["status"],
        )
        .expect("valid order_transitions_total metric");

        let assignment_attempts_total = IntCounterVec::new(
            Opts::new("assignment_attempts_total", "Delivery claim attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignment_attempts_total metric");

        let payments_settled_total = IntCounterVec::new(
            Opts::new("payments_settled_total", "Payment settlements by outcome"),
            &["outcome"],
        )
        .expect("valid payments_settled_total metric");

        let events_published_total = IntCounterVec::new(
            Opts::new("events_published_total", "Lifecycle events published by name"),
            &["event"],
        )
        .expect("valid events_published_total metric");

        let ws_connections = IntGauge::new("ws_connections", "Live websocket connections")
            .expect("valid ws_connections metric");

        let match_queue_depth =
            IntGauge::new("match_queue_depth", "Orders waiting for courier matching")
                .expect("valid match_queue_depth metric");

        let match_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "match_latency_seconds",
            "Time spent notifying nearby couriers of a new order",
        ))
        .expect("valid match_latency_seconds metric");

        registry
            .register(Box::new(orders_placed_total.clone()))
            .expect("register orders_placed_total");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(assignment_attempts_total.clone()))
            .expect("register assignment_attempts_total");
        registry
            .register(Box::new(payments_settled_total.clone()))
            .expect("register payments_settled_total");
        registry
            .register(Box::new(events_published_total.clone()))
            .expect("register events_published_total");
        registry
            .register(Box::new(ws_connections.clone()))
            .expect("register ws_connections");
        registry
            .register(Box::new(match_queue_depth.clone()))
            .expect("register match_queue_depth");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");

        Self {
            registry,
            orders_placed_total,
            order_transitions_total,
            assignment_attempts_total,
            payments_settled_total,
            events_published_total,
            ws_connections,
            match_queue_depth,
            match_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
