use std::net::SocketAddr;

// ── Booking flow ────────────────────────────────────────────────

/// Counter: bookings recorded. Labels: path (`create` | `reserve`).
pub const BOOKINGS_CREATED_TOTAL: &str = "agenda_bookings_created_total";

/// Counter: booking attempts refused because the slot was full. Labels: path.
pub const SLOT_FULL_TOTAL: &str = "agenda_slot_full_total";

/// Counter: status transitions applied. Labels: status.
pub const STATUS_CHANGES_TOTAL: &str = "agenda_status_changes_total";

/// Counter: local bookings written to the remote system of record.
pub const BOOKINGS_PUBLISHED_TOTAL: &str = "agenda_bookings_published_total";

// ── Remote sync ─────────────────────────────────────────────────

/// Counter: remote fetch attempts. Labels: cache, outcome (`fetched` | `stale` | `failed`).
pub const REMOTE_FETCHES_TOTAL: &str = "agenda_remote_fetches_total";

/// Gauge: resources in the current directory snapshot.
pub const RESOURCES_INDEXED: &str = "agenda_resources_indexed";

// ── Local persistence ───────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "agenda_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "agenda_wal_flush_batch_size";

/// Install the fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(
    port: Option<u16>,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
