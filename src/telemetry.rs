//! Metric recording helpers. Without an installed recorder these are no-ops.

use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::storage::Outcome;

/// Installs the global Prometheus recorder. Only one recorder may exist per process.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

pub fn record_conversation(outcome: Outcome, elapsed: Duration) {
    counter!("oracle_conversations_total", "outcome" => outcome.as_str()).increment(1);
    histogram!("oracle_conversation_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_estimated_tokens(input: u64, output: u64) {
    counter!("oracle_estimated_tokens_total", "direction" => "input").increment(input);
    counter!("oracle_estimated_tokens_total", "direction" => "output").increment(output);
}

pub fn record_audit(outcome: Outcome) {
    counter!("oracle_audit_records_total", "outcome" => outcome.as_str()).increment(1);
}
