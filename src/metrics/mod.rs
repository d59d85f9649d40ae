//! Cross-cutting metrics (§10.5).
//!
//! Installs a Prometheus recorder at startup and exposes a handle whose
//! `render()` backs the `GET /metrics` route. Individual components call the
//! small `record_*` helpers below rather than reaching for the `metrics`
//! macros directly, so label names stay consistent in one place.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn install() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus metrics recorder")
}

/// Per-command dispatch outcome (§4.E: "Emit one metric per command with
/// label success ∈ {true,false}").
pub fn record_command_dispatch(command_type: &str, success: bool) {
    metrics::counter!(
        "gridkeep_command_dispatch_total",
        "command_type" => command_type.to_string(),
        "success" => success.to_string(),
    )
    .increment(1);
}

/// Heartbeat ingestion, labeled by the derived status transition (§4.D).
pub fn record_heartbeat(from: &str, to: &str) {
    metrics::counter!(
        "gridkeep_heartbeat_total",
        "from" => from.to_string(),
        "to" => to.to_string(),
    )
    .increment(1);
}

/// Console lines multicast to subscribers (§4.H upstream path).
pub fn record_console_multicast(server_id: &str, subscriber_count: usize) {
    metrics::counter!("gridkeep_console_lines_multicast_total", "server_id" => server_id.to_string())
        .increment(subscriber_count as u64);
}

/// Session-registry connect/disconnect events (§4.F).
pub fn record_session_registry_event(event: &str) {
    metrics::counter!("gridkeep_console_session_registry_total", "event" => event.to_string())
        .increment(1);
}

/// Console history archival batches moved hot -> cold (§4.G).
pub fn record_archive_batch(rows: usize) {
    metrics::counter!("gridkeep_console_archive_batches_total").increment(1);
    metrics::counter!("gridkeep_console_archive_rows_total").increment(rows as u64);
}

/// Cold-tier retention sweeper deletions (§4.G).
pub fn record_retention_sweep(deleted_rows: u64) {
    metrics::counter!("gridkeep_console_retention_deleted_total").increment(deleted_rows);
}
