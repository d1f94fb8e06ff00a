//! Prometheus metrics for snare.
//!
//! Tracks rule evaluation, applied actions, and silently degraded rules
//! (bad regexes, unparsable overrides) that would otherwise go unnoticed.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Rules evaluated against an exchange (after method/validity filtering)
    pub static ref RULE_EVALUATIONS_TOTAL: CounterVec = register_counter_vec!(
        "snare_rule_evaluations_total",
        "Total number of rule matcher evaluations",
        &["phase"]
    )
    .unwrap();

    /// Rules whose matcher held and whose action ran
    pub static ref RULES_APPLIED_TOTAL: CounterVec = register_counter_vec!(
        "snare_rules_applied_total",
        "Total number of rule actions applied",
        &["action", "phase"]
    )
    .unwrap();

    /// Rules skipped before evaluation
    pub static ref RULES_SKIPPED_TOTAL: CounterVec = register_counter_vec!(
        "snare_rules_skipped_total",
        "Total number of rules skipped before matching",
        &["reason"]  // reason: invalid|method
    )
    .unwrap();

    /// Exchanges processed per phase and resulting disposition
    pub static ref EXCHANGES_TOTAL: CounterVec = register_counter_vec!(
        "snare_exchanges_total",
        "Total number of exchanges processed by the rule engine",
        &["phase", "disposition"]
    )
    .unwrap();

    /// Rules that degraded to a no-op or rollback
    pub static ref DEGRADED_TOTAL: CounterVec = register_counter_vec!(
        "snare_degraded_total",
        "Total number of silently degraded matcher or action evaluations",
        &["kind"]  // kind: bad_regex|bad_json|url_rollback|missing_payload
    )
    .unwrap();

    /// Upstream round-trip duration in the bundled proxy
    pub static ref UPSTREAM_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "snare_upstream_request_duration_ms",
        "Duration of upstream requests made by the proxy",
        &["method", "status"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_evaluation(phase: &str) {
    RULE_EVALUATIONS_TOTAL.with_label_values(&[phase]).inc();
}

pub fn record_applied(action: &str, phase: &str) {
    RULES_APPLIED_TOTAL.with_label_values(&[action, phase]).inc();
}

pub fn record_skipped(reason: &str) {
    RULES_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_exchange(phase: &str, disposition: &str) {
    EXCHANGES_TOTAL.with_label_values(&[phase, disposition]).inc();
}

pub fn record_degraded(kind: &str) {
    DEGRADED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_upstream_duration(method: &str, status: u16, duration_ms: f64) {
    UPSTREAM_REQUEST_DURATION_MS
        .with_label_values(&[method, &status.to_string()])
        .observe(duration_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        record_evaluation("request");
        record_applied("timeout", "response");
        record_skipped("invalid");
        record_exchange("request", "forward");
        record_degraded("url_rollback");
        record_upstream_duration("GET", 200, 12.5);

        let metrics = collect_metrics();

        assert!(metrics.contains("snare_rule_evaluations_total"));
        assert!(metrics.contains("snare_rules_applied_total"));
        assert!(metrics.contains("snare_rules_skipped_total"));
        assert!(metrics.contains("snare_exchanges_total"));
        assert!(metrics.contains("snare_degraded_total"));
        assert!(metrics.contains("snare_upstream_request_duration_ms"));
    }
}
