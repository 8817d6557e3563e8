use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError, Store};

// Reads take no engine lock. They may miss a mutation that is still between
// its WAL append and store apply, which is fine: writers re-validate.

impl<S: Store> Engine<S> {
    // ── Reservations ─────────────────────────────────────

    /// Any state.
    pub fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.store()
            .get_any(&id)
            .ok_or_else(|| EngineError::not_found("reservation", id))
    }

    /// `NotFound` for cancelled reservations too.
    pub fn get_active_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.store()
            .get_active(&id)
            .ok_or_else(|| EngineError::not_found("active reservation", id))
    }

    pub fn list_active_reservations(&self) -> Vec<Reservation> {
        self.store().list_active()
    }

    /// Every reservation in creation order, cancelled ones included.
    pub fn list_reservations(&self) -> Vec<Reservation> {
        self.store().list_all()
    }

    /// Every reservation on one slot, sorted by start time.
    pub fn list_reservations_for_slot(&self, slot_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        if self.store().slot(&slot_id).is_none() {
            return Err(EngineError::not_found("slot", slot_id));
        }
        let mut out = self.store().reservations_for_slot(&slot_id);
        out.sort_by_key(|r| (r.span.start, r.id));
        Ok(out)
    }

    // ── Floors ───────────────────────────────────────────

    pub fn get_floor(&self, id: Ulid) -> Result<Floor, EngineError> {
        self.store()
            .floor(&id)
            .ok_or_else(|| EngineError::not_found("floor", id))
    }

    pub fn get_floor_by_number(&self, number: i32) -> Result<Floor, EngineError> {
        self.store()
            .floor_by_number(number)
            .ok_or_else(|| EngineError::not_found("floor number", number))
    }

    pub fn list_floors(&self) -> Vec<Floor> {
        self.store().floors()
    }

    // ── Vehicle types ────────────────────────────────────

    pub fn get_vehicle_type(&self, id: Ulid) -> Result<VehicleType, EngineError> {
        self.store()
            .vehicle_type(&id)
            .ok_or_else(|| EngineError::not_found("vehicle type", id))
    }

    pub fn list_vehicle_types(&self) -> Vec<VehicleType> {
        self.store().vehicle_types()
    }

    // ── Slots ────────────────────────────────────────────

    pub fn get_slot(&self, id: Ulid) -> Result<Slot, EngineError> {
        self.store()
            .slot(&id)
            .ok_or_else(|| EngineError::not_found("slot", id))
    }

    pub fn list_slots(&self) -> Vec<Slot> {
        self.store().slots()
    }

    pub fn list_slots_by_floor(&self, floor_id: Ulid) -> Result<Vec<Slot>, EngineError> {
        self.get_floor(floor_id)?;
        Ok(self.store().slots_by_floor(&floor_id))
    }

    pub fn list_slots_by_vehicle_type(&self, vehicle_type_id: Ulid) -> Result<Vec<Slot>, EngineError> {
        self.get_vehicle_type(vehicle_type_id)?;
        Ok(self.store().slots_by_vehicle_type(&vehicle_type_id))
    }
}
