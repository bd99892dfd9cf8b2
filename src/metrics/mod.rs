//! Metrics collection for observability

use prometheus::{
    Counter, CounterVec, Histogram, HistogramVec, Opts, Registry,
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_counter_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;
use once_cell::sync::Lazy;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Turn pipeline metrics
    pub turns: CounterVec,
    pub turn_duration: Histogram,
    pub threads_created: Counter,

    // Gateway metrics
    pub gateway_requests: CounterVec,
    pub gateway_duration: HistogramVec,

    // Token budget metrics
    pub token_budget_used: Histogram,
    pub token_budget_remaining: Histogram,
    pub token_budget_overflows: Counter,
    pub history_turns_omitted: Counter,
    pub truncations: CounterVec,

    // Storage metrics
    pub store_writes: CounterVec,
    pub threads_pruned: Counter,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let turns = register_counter_vec_with_registry!(
            Opts::new("chat_turns_total", "Total chat turns by outcome"),
            &["outcome"],
            registry
        )?;

        let turn_duration = register_histogram_with_registry!(
            "chat_turn_duration_seconds",
            "End-to-end turn duration in seconds",
            registry
        )?;

        let threads_created = register_counter_with_registry!(
            Opts::new("chat_threads_created_total", "Total conversation threads created"),
            registry
        )?;

        let gateway_requests = register_counter_vec_with_registry!(
            Opts::new("gateway_requests_total", "Total upstream chat requests"),
            &["status"],
            registry
        )?;

        let gateway_duration = register_histogram_vec_with_registry!(
            "gateway_request_duration_seconds",
            "Upstream chat request duration in seconds",
            &["model"],
            registry
        )?;

        let token_budget_used = register_histogram_with_registry!(
            "token_budget_used",
            "Tokens used per request",
            registry
        )?;

        let token_budget_remaining = register_histogram_with_registry!(
            "token_budget_remaining",
            "Tokens remaining per request",
            registry
        )?;

        let token_budget_overflows = register_counter_with_registry!(
            Opts::new("token_budget_overflows_total", "Total requests rejected as too large"),
            registry
        )?;

        let history_turns_omitted = register_counter_with_registry!(
            Opts::new("history_turns_omitted_total", "Total history turns left out of requests"),
            registry
        )?;

        let truncations = register_counter_vec_with_registry!(
            Opts::new("truncations_total", "Total truncation notices by kind"),
            &["kind"],
            registry
        )?;

        let store_writes = register_counter_vec_with_registry!(
            Opts::new("store_writes_total", "Total conversation store writes"),
            &["status"],
            registry
        )?;

        let threads_pruned = register_counter_with_registry!(
            Opts::new("threads_pruned_total", "Total threads removed by retention"),
            registry
        )?;

        Ok(Self {
            registry,
            turns,
            turn_duration,
            threads_created,
            gateway_requests,
            gateway_duration,
            token_budget_used,
            token_budget_remaining,
            token_budget_overflows,
            history_turns_omitted,
            truncations,
            store_writes,
            threads_pruned,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a finished turn; `outcome` is `success` or an error code
    pub fn record_turn(&self, outcome: &str, seconds: f64) {
        self.turns.with_label_values(&[outcome]).inc();
        self.turn_duration.observe(seconds);
    }

    pub fn record_gateway(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.gateway_requests.with_label_values(&[status]).inc();
    }

    /// Record token budget usage
    pub fn record_token_budget(&self, used: usize, remaining: usize, overflow: bool) {
        self.token_budget_used.observe(used as f64);
        self.token_budget_remaining.observe(remaining as f64);
        if overflow {
            self.token_budget_overflows.inc();
        }
    }

    pub fn record_truncation(&self, kind: &str) {
        self.truncations.with_label_values(&[kind]).inc();
    }

    pub fn record_store_write(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.store_writes.with_label_values(&[status]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Helper macro to time operations
#[macro_export]
macro_rules! time_operation {
    ($histogram:expr, $label:expr, $operation:expr) => {{
        let timer = $histogram.with_label_values(&[$label]).start_timer();
        let result = $operation;
        timer.observe_duration();
        result
    }};
}
