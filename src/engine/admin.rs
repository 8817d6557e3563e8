use rust_decimal::Decimal;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, Store};

fn check_name(field: &'static str, value: &str, max_len: usize) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidField {
            field,
            reason: "must not be blank",
        });
    }
    if value.len() > max_len {
        return Err(EngineError::InvalidField {
            field,
            reason: "too long",
        });
    }
    Ok(())
}

impl<S: Store> Engine<S> {
    // ── Floors ───────────────────────────────────────────

    pub async fn create_floor(
        &self,
        number: i32,
        name: &str,
        total_slots: u32,
    ) -> Result<Floor, EngineError> {
        if number <= 0 {
            return Err(EngineError::InvalidField {
                field: "floor number",
                reason: "must be positive",
            });
        }
        check_name("floor name", name, MAX_NAME_LEN)?;
        if total_slots == 0 {
            return Err(EngineError::InvalidField {
                field: "total slots",
                reason: "must be positive",
            });
        }

        let _admin = self.admin_lock.lock().await;
        if self.store().floor_count() >= MAX_FLOORS {
            return Err(EngineError::LimitExceeded("too many floors"));
        }
        if self.store().floor_number_exists(number) {
            return Err(EngineError::duplicate("floor", number));
        }

        let floor = Floor {
            id: self.next_id(),
            number,
            name: name.trim().to_string(),
            total_slots,
        };
        self.persist_and_apply(&Event::FloorCreated(floor.clone()))
            .await?;
        info!("floor {} created as number {number}", floor.id);
        Ok(floor)
    }

    /// Delete a floor together with its slots and all their reservations.
    pub async fn delete_floor(&self, id: Ulid) -> Result<Floor, EngineError> {
        let _admin = self.admin_lock.lock().await;
        let floor = self.get_floor(id)?;

        // New slots can't appear while we hold the admin lock.
        let mut slot_ids: Vec<Ulid> = self
            .store()
            .slots_by_floor(&id)
            .iter()
            .map(|s| s.id)
            .collect();
        let _slots = self.slot_locks.lock_all(&mut slot_ids).await;

        self.persist_and_apply(&Event::FloorDeleted { id }).await?;
        info!("floor {id} deleted with {} slots", slot_ids.len());
        Ok(floor)
    }

    // ── Vehicle types ────────────────────────────────────

    pub async fn create_vehicle_type(
        &self,
        name: &str,
        hourly_rate: Decimal,
        description: &str,
    ) -> Result<VehicleType, EngineError> {
        check_name("vehicle type name", name, MAX_NAME_LEN)?;
        if hourly_rate <= Decimal::ZERO {
            return Err(EngineError::InvalidField {
                field: "hourly rate",
                reason: "must be positive",
            });
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(EngineError::InvalidField {
                field: "description",
                reason: "too long",
            });
        }

        let name = name.trim();
        let _admin = self.admin_lock.lock().await;
        if self.store().vehicle_type_count() >= MAX_VEHICLE_TYPES {
            return Err(EngineError::LimitExceeded("too many vehicle types"));
        }
        if self.store().vehicle_type_name_exists(name) {
            return Err(EngineError::duplicate("vehicle type", name));
        }

        let vehicle_type = VehicleType {
            id: self.next_id(),
            name: name.to_string(),
            hourly_rate,
            description: description.to_string(),
        };
        self.persist_and_apply(&Event::VehicleTypeCreated(vehicle_type.clone()))
            .await?;
        info!(
            "vehicle type {} created: {} at {}/h",
            vehicle_type.id, vehicle_type.name, vehicle_type.hourly_rate
        );
        Ok(vehicle_type)
    }

    // ── Slots ────────────────────────────────────────────

    /// New slots start enabled.
    pub async fn create_slot(
        &self,
        slot_number: &str,
        floor_id: Ulid,
        vehicle_type_id: Ulid,
    ) -> Result<Slot, EngineError> {
        check_name("slot number", slot_number, MAX_SLOT_NUMBER_LEN)?;
        let slot_number = slot_number.trim();

        let _admin = self.admin_lock.lock().await;
        self.get_floor(floor_id)?;
        self.get_vehicle_type(vehicle_type_id)?;
        if self.store().slot_count() >= MAX_SLOTS {
            return Err(EngineError::LimitExceeded("too many slots"));
        }
        if self.store().slot_number_exists(slot_number, &floor_id) {
            return Err(EngineError::duplicate("slot", slot_number));
        }

        let slot = Slot {
            id: self.next_id(),
            slot_number: slot_number.to_string(),
            floor_id,
            vehicle_type_id,
            is_available: true,
        };
        self.persist_and_apply(&Event::SlotCreated(slot.clone()))
            .await?;
        info!("slot {} created: {} on floor {floor_id}", slot.id, slot.slot_number);
        Ok(slot)
    }

    /// Enable or disable a slot for new reservations. Existing reservations
    /// are left alone. Setting the current value is a no-op.
    pub async fn set_slot_availability(
        &self,
        id: Ulid,
        is_available: bool,
    ) -> Result<Slot, EngineError> {
        let _slot = self.slot_locks.lock(&id).await;
        let mut slot = self.get_slot(id)?;
        if slot.is_available == is_available {
            return Ok(slot);
        }

        self.persist_and_apply(&Event::SlotAvailabilityChanged { id, is_available })
            .await?;
        slot.is_available = is_available;
        info!("slot {id} availability set to {is_available}");
        Ok(slot)
    }

    /// Delete a slot and every reservation on it.
    pub async fn delete_slot(&self, id: Ulid) -> Result<Slot, EngineError> {
        let _admin = self.admin_lock.lock().await;
        let _slot = self.slot_locks.lock(&id).await;
        let slot = self.get_slot(id)?;

        self.persist_and_apply(&Event::SlotDeleted { id }).await?;
        info!("slot {id} deleted");
        Ok(slot)
    }
}
