use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_created_total: IntCounterVec,
    pub dispatch_latency_seconds: Histogram,
    pub secondary_failures_total: IntCounterVec,
    pub relay_events_total: IntCounterVec,
    pub relay_connections: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_created_total = IntCounterVec::new(
            Opts::new("orders_created_total", "Orders created by assignment outcome"),
            &["assignment"],
        )
        .expect("valid orders_created_total metric");

        let dispatch_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "dispatch_latency_seconds",
            "Time spent ranking and claiming a driver in seconds",
        ))
        .expect("valid dispatch_latency_seconds metric");

        let secondary_failures_total = IntCounterVec::new(
            Opts::new(
                "secondary_failures_total",
                "Best-effort side effects that failed and were swallowed",
            ),
            &["effect"],
        )
        .expect("valid secondary_failures_total metric");

        let relay_events_total = IntCounterVec::new(
            Opts::new("relay_events_total", "Relay events published by event name"),
            &["event"],
        )
        .expect("valid relay_events_total metric");

        let relay_connections =
            IntGauge::new("relay_connections", "Currently open relay websocket connections")
                .expect("valid relay_connections metric");

        registry
            .register(Box::new(orders_created_total.clone()))
            .expect("register orders_created_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(secondary_failures_total.clone()))
            .expect("register secondary_failures_total");
        registry
            .register(Box::new(relay_events_total.clone()))
            .expect("register relay_events_total");
        registry
            .register(Box::new(relay_connections.clone()))
            .expect("register relay_connections");

        Self {
            registry,
            orders_created_total,
            dispatch_latency_seconds,
            secondary_failures_total,
            relay_events_total,
            relay_connections,
        }
    }

    pub fn record_secondary_failure(&self, effect: &str) {
        self.secondary_failures_total
            .with_label_values(&[effect])
            .inc();
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
