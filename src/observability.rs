use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: service operations. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "appointd_operations_total";

/// Histogram: service operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "appointd_operation_duration_seconds";

// ── Scheduling outcomes ─────────────────────────────────────────

/// Counter: appointments successfully booked.
pub const APPOINTMENTS_CREATED_TOTAL: &str = "appointd_appointments_created_total";

/// Counter: creates rejected because the resource was already booked.
pub const CONFLICTS_TOTAL: &str = "appointd_conflicts_total";

/// Counter: requests refused by the access policy. Labels: action.
pub const AUTHZ_DENIED_TOTAL: &str = "appointd_authz_denied_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "appointd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "appointd_wal_flush_batch_size";

/// Gauge: appointments currently held by the store.
pub const APPOINTMENTS_LIVE: &str = "appointd_appointments_live";

/// Counter: WAL compactions run.
pub const COMPACTIONS_TOTAL: &str = "appointd_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
