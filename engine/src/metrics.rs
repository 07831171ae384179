//! Prometheus metrics for alert runs

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

// ── Runs ─────────────────────────────────────────────────────────────────────

pub static RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("vigil_runs_total", "Alert runs by result", &["result"]).unwrap()
});

pub static RUN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "vigil_run_duration_seconds",
        "Wall time of one period/site alert run",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap()
});

// ── Rules ────────────────────────────────────────────────────────────────────

pub static RULE_OUTCOMES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vigil_rule_outcomes_total",
        "Per-rule evaluation outcomes",
        &["outcome"]
    )
    .unwrap()
});

pub static ALERTS_TRIGGERED: Lazy<Counter> = Lazy::new(|| {
    register_counter!("vigil_alerts_triggered_total", "Triggered alerts recorded").unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
