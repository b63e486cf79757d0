use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "seatledger_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "seatledger_query_duration_seconds";

// ── Ledger activity ─────────────────────────────────────────────

/// Counter: seats successfully booked.
pub const SEATS_BOOKED_TOTAL: &str = "seatledger_seats_booked_total";

/// Counter: seats successfully cancelled.
pub const SEATS_CANCELLED_TOTAL: &str = "seatledger_seats_cancelled_total";

/// Counter: book/cancel attempts refused by the engine. Labels: reason.
pub const BOOKING_REJECTIONS_TOTAL: &str = "seatledger_booking_rejections_total";

/// Gauge: trips in the catalogue.
pub const CATALOGUE_TRIPS: &str = "seatledger_catalogue_trips";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "seatledger_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "seatledger_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "seatledger_connections_rejected_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SelectTrip { .. } => "get_trip",
        Command::SelectTrips { filter } if filter.is_empty() => "list_available",
        Command::SelectTrips { .. } => "search",
        Command::InsertBooking { .. } => "book",
        Command::BatchInsertBookings { .. } => "batch_book",
        Command::DeleteBooking { .. } => "cancel",
        Command::SelectBookings { .. } => "holdings",
    }
}
