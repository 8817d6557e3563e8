use std::time::Instant;

use tracing::{debug, error, info};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{
    OPERATION_DURATION_SECONDS, RESERVATIONS_CANCELLED_TOTAL, RESERVATIONS_CREATED_TOTAL,
    RESERVATIONS_REJECTED_TOTAL, rejection_label,
};
use crate::{plate, pricing};

use super::conflict::{check_slot_conflict, check_vehicle_conflict, now_ms, validate_reservation_span};
use super::{Engine, EngineError, ErrorKind, Store};

impl<S: Store> Engine<S> {
    /// Book `request.slot_id` for `request.vehicle_number` over `request.span`.
    ///
    /// Checks run in a fixed order: span, plate format, slot existence,
    /// slot enabled, slot overlap, vehicle overlap. The first failure wins
    /// and nothing is written. On success the priced reservation is durable
    /// before it is returned.
    pub async fn create_reservation(
        &self,
        request: ReservationRequest,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self.try_create_reservation(request).await;
        metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => "create_reservation")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(r) => {
                metrics::counter!(RESERVATIONS_CREATED_TOTAL).increment(1);
                info!(
                    "reservation {} created: slot {} vehicle {} [{}, {}) cost {}",
                    r.id, r.slot_id, r.vehicle_number, r.span.start, r.span.end, r.total_cost
                );
            }
            Err(e) => {
                metrics::counter!(RESERVATIONS_REJECTED_TOTAL, "reason" => rejection_label(e))
                    .increment(1);
                if e.kind() == ErrorKind::Unexpected {
                    error!("create reservation failed: {e}");
                } else {
                    debug!("create reservation rejected: {e}");
                }
            }
        }
        result
    }

    async fn try_create_reservation(
        &self,
        request: ReservationRequest,
    ) -> Result<Reservation, EngineError> {
        let ReservationRequest {
            slot_id,
            vehicle_number,
            span,
        } = request;

        validate_reservation_span(&span)?;
        if !plate::is_valid(&vehicle_number) {
            return Err(EngineError::InvalidVehicleNumber(vehicle_number));
        }

        // Vehicle before slot, everywhere.
        let _vehicle = self.vehicle_locks.lock(&vehicle_number).await;
        let _slot = self.slot_locks.lock(&slot_id).await;

        let store = self.store();
        let slot = store
            .slot(&slot_id)
            .ok_or_else(|| EngineError::not_found("slot", slot_id))?;
        if !slot.is_available {
            return Err(EngineError::SlotDisabled(slot_id));
        }
        check_slot_conflict(store, slot_id, &span)?;
        check_vehicle_conflict(store, &vehicle_number, &span)?;

        let vehicle_type = store
            .vehicle_type(&slot.vehicle_type_id)
            .ok_or_else(|| EngineError::not_found("vehicle type", slot.vehicle_type_id))?;

        let reservation = Reservation {
            id: self.next_id(),
            slot_id,
            vehicle_number,
            span,
            total_cost: pricing::cost(vehicle_type.hourly_rate, &span),
            duration_hours: pricing::billable_hours(&span),
            status: ReservationStatus::Active,
            created_at: now_ms(),
        };
        self.persist_and_apply(&Event::ReservationCreated(reservation.clone()))
            .await?;
        Ok(reservation)
    }

    /// Cancel a reservation that has not started yet and return the
    /// updated record.
    ///
    /// A second cancel is a conflict, not a not-found: the lookup sees
    /// reservations in every state.
    pub async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self.try_cancel_reservation(id).await;
        metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => "cancel_reservation")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(r) => {
                metrics::counter!(RESERVATIONS_CANCELLED_TOTAL).increment(1);
                info!("reservation {} cancelled on slot {}", r.id, r.slot_id);
            }
            Err(e) if e.kind() == ErrorKind::Unexpected => {
                error!("cancel reservation {id} failed: {e}");
            }
            Err(e) => debug!("cancel reservation {id} rejected: {e}"),
        }
        result
    }

    async fn try_cancel_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let slot_id = self
            .store()
            .get_any(&id)
            .ok_or_else(|| EngineError::not_found("reservation", id))?
            .slot_id;

        let _slot = self.slot_locks.lock(&slot_id).await;

        // Re-read under the lock: a racing cancel or slot delete may have won.
        let mut reservation = self
            .store()
            .get_any(&id)
            .ok_or_else(|| EngineError::not_found("reservation", id))?;
        if !reservation.is_active() {
            return Err(EngineError::AlreadyCancelled(id));
        }
        if reservation.span.start <= now_ms() {
            return Err(EngineError::AlreadyStarted(id));
        }

        reservation.status = ReservationStatus::Cancelled;
        self.persist_and_apply(&Event::ReservationCancelled { id, slot_id })
            .await?;
        Ok(reservation)
    }
}
