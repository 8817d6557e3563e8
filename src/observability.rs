use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservations accepted and persisted.
pub const RESERVATIONS_CREATED_TOTAL: &str = "parkade_reservations_created_total";

/// Counter: create requests refused. Labels: reason.
pub const RESERVATIONS_REJECTED_TOTAL: &str = "parkade_reservations_rejected_total";

/// Counter: reservations moved to Cancelled.
pub const RESERVATIONS_CANCELLED_TOTAL: &str = "parkade_reservations_cancelled_total";

/// Histogram: engine operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "parkade_operation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "parkade_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "parkade_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "parkade_wal_compactions_total";

#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("failed to install Prometheus metrics exporter: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), ObservabilityError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for why a create request was refused.
pub fn rejection_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::InvalidSpan { .. } | EngineError::SpanTooLong { .. } => "invalid_span",
        EngineError::InvalidVehicleNumber(_) => "invalid_vehicle_number",
        EngineError::NotFound { .. } => "slot_not_found",
        EngineError::SlotDisabled(_) => "slot_disabled",
        EngineError::SlotOccupied { .. } => "slot_conflict",
        EngineError::VehicleDoubleBooked { .. } => "vehicle_conflict",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use ulid::Ulid;

    use super::*;

    #[test]
    fn init_without_port_is_noop() {
        assert!(init(None).is_ok());
    }

    #[test]
    fn install_failure_names_the_exporter() {
        let err = ObservabilityError::from(
            metrics_exporter_prometheus::BuildError::FailedToCreateHTTPListener(
                "address in use".into(),
            ),
        );
        assert!(
            err.to_string()
                .starts_with("failed to install Prometheus metrics exporter:")
                && err.to_string().ends_with("address in use"),
            "{err}"
        );
    }

    #[test]
    fn conflict_reasons_are_distinct() {
        let slot = rejection_label(&EngineError::SlotOccupied {
            slot_id: Ulid::new(),
            reservation_id: Ulid::new(),
        });
        let vehicle = rejection_label(&EngineError::VehicleDoubleBooked {
            vehicle_number: "KA01AB1234".into(),
            reservation_id: Ulid::new(),
        });
        assert_eq!(slot, "slot_conflict");
        assert_eq!(vehicle, "vehicle_conflict");
    }
}
