use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

// ── Store seams ──────────────────────────────────────────────────
//
// The engine serializes writers itself (see `LockTable`), so stores only
// need each call to be individually atomic. Listings come back in a stable
// order so callers can page over them.

pub trait FloorStore {
    fn floor(&self, id: &Ulid) -> Option<Floor>;
    fn floor_by_number(&self, number: i32) -> Option<Floor>;
    /// Ordered by floor number.
    fn floors(&self) -> Vec<Floor>;
    fn floor_number_exists(&self, number: i32) -> bool;
    fn floor_count(&self) -> usize;
    fn save_floor(&self, floor: Floor);
    /// Removes only the floor row; cascading to slots is the caller's job.
    fn delete_floor(&self, id: &Ulid) -> Option<Floor>;
}

pub trait VehicleTypeStore {
    fn vehicle_type(&self, id: &Ulid) -> Option<VehicleType>;
    /// Ordered by name.
    fn vehicle_types(&self) -> Vec<VehicleType>;
    fn vehicle_type_name_exists(&self, name: &str) -> bool;
    fn vehicle_type_count(&self) -> usize;
    fn save_vehicle_type(&self, vehicle_type: VehicleType);
}

pub trait SlotStore {
    fn slot(&self, id: &Ulid) -> Option<Slot>;
    /// Ordered by id.
    fn slots(&self) -> Vec<Slot>;
    fn slots_by_floor(&self, floor_id: &Ulid) -> Vec<Slot>;
    fn slots_by_vehicle_type(&self, vehicle_type_id: &Ulid) -> Vec<Slot>;
    fn slot_number_exists(&self, slot_number: &str, floor_id: &Ulid) -> bool;
    fn slot_count(&self) -> usize;
    fn save_slot(&self, slot: Slot);
    /// Removes the slot and every reservation on it, in any state.
    fn delete_slot(&self, id: &Ulid) -> Option<Slot>;
}

pub trait ReservationStore {
    /// Any state. This is the lookup cancellation must use.
    fn get_any(&self, id: &Ulid) -> Option<Reservation>;
    /// `None` for cancelled reservations.
    fn get_active(&self, id: &Ulid) -> Option<Reservation>;
    /// Insert or replace. Keeps the active-overlap indexes in step with `status`.
    fn save_reservation(&self, reservation: Reservation);
    /// Ordered by id (creation order).
    fn list_active(&self) -> Vec<Reservation>;
    /// Ordered by id (creation order).
    fn list_all(&self) -> Vec<Reservation>;
    fn reservations_for_slot(&self, slot_id: &Ulid) -> Vec<Reservation>;
    fn find_active_overlaps(&self, slot_id: &Ulid, span: &Span) -> Vec<Reservation>;
    fn find_active_overlaps_for_vehicle(&self, vehicle_number: &str, span: &Span)
    -> Vec<Reservation>;
    /// Administratively enabled slots with no active reservation overlapping
    /// `span`, optionally restricted to one vehicle type. Ordered by id.
    fn find_available_slots(&self, span: &Span, vehicle_type_id: Option<&Ulid>) -> Vec<Slot>;
}

/// Everything the engine needs from persistence.
pub trait Store: FloorStore + VehicleTypeStore + SlotStore + ReservationStore + Send + Sync {}

impl<T> Store for T where T: FloorStore + VehicleTypeStore + SlotStore + ReservationStore + Send + Sync
{}

// ── In-memory implementation ─────────────────────────────────────

/// DashMap-backed store. Durability comes from the engine's WAL, which is
/// replayed into a fresh store on open.
pub struct InMemoryStore {
    floors: DashMap<Ulid, Floor>,
    vehicle_types: DashMap<Ulid, VehicleType>,
    slots: DashMap<Ulid, Slot>,
    reservations: DashMap<Ulid, Reservation>,
    /// Slot → every reservation id on it, any state (for cascade and listing).
    slot_reservations: DashMap<Ulid, Vec<Ulid>>,
    /// Slot → active reservations, sorted by start.
    slot_schedules: DashMap<Ulid, Schedule>,
    /// Vehicle number → active reservations, sorted by start.
    vehicle_schedules: DashMap<String, Schedule>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            floors: DashMap::new(),
            vehicle_types: DashMap::new(),
            slots: DashMap::new(),
            reservations: DashMap::new(),
            slot_reservations: DashMap::new(),
            slot_schedules: DashMap::new(),
            vehicle_schedules: DashMap::new(),
        }
    }

    fn index_active(&self, r: &Reservation) {
        self.slot_schedules
            .entry(r.slot_id)
            .or_default()
            .insert(r.id, r.span);
        self.vehicle_schedules
            .entry(r.vehicle_number.clone())
            .or_default()
            .insert(r.id, r.span);
    }

    fn unindex_active(&self, r: &Reservation) {
        if let Some(mut sched) = self.slot_schedules.get_mut(&r.slot_id) {
            sched.remove(r.id);
        }
        if let Some(mut sched) = self.vehicle_schedules.get_mut(&r.vehicle_number) {
            sched.remove(r.id);
        }
        self.vehicle_schedules
            .remove_if(&r.vehicle_number, |_, sched| sched.is_empty());
    }

    fn resolve(&self, ids: Vec<Ulid>) -> Vec<Reservation> {
        ids.into_iter()
            .filter_map(|id| self.reservations.get(&id).map(|r| r.value().clone()))
            .collect()
    }

    fn sorted_slots(&self, keep: impl Fn(&Slot) -> bool) -> Vec<Slot> {
        let mut out: Vec<Slot> = self
            .slots
            .iter()
            .filter(|e| keep(e.value()))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|s| s.id);
        out
    }

    fn sorted_reservations(&self, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let mut out: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|e| keep(e.value()))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|r| r.id);
        out
    }

    fn slot_is_free(&self, slot_id: &Ulid, span: &Span) -> bool {
        self.slot_schedules
            .get(slot_id)
            .is_none_or(|sched| sched.overlapping(span).next().is_none())
    }
}

impl FloorStore for InMemoryStore {
    fn floor(&self, id: &Ulid) -> Option<Floor> {
        self.floors.get(id).map(|e| e.value().clone())
    }

    fn floor_by_number(&self, number: i32) -> Option<Floor> {
        self.floors
            .iter()
            .find(|e| e.value().number == number)
            .map(|e| e.value().clone())
    }

    fn floors(&self) -> Vec<Floor> {
        let mut out: Vec<Floor> = self.floors.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|f| f.number);
        out
    }

    fn floor_number_exists(&self, number: i32) -> bool {
        self.floors.iter().any(|e| e.value().number == number)
    }

    fn floor_count(&self) -> usize {
        self.floors.len()
    }

    fn save_floor(&self, floor: Floor) {
        self.floors.insert(floor.id, floor);
    }

    fn delete_floor(&self, id: &Ulid) -> Option<Floor> {
        self.floors.remove(id).map(|(_, f)| f)
    }
}

impl VehicleTypeStore for InMemoryStore {
    fn vehicle_type(&self, id: &Ulid) -> Option<VehicleType> {
        self.vehicle_types.get(id).map(|e| e.value().clone())
    }

    fn vehicle_types(&self) -> Vec<VehicleType> {
        let mut out: Vec<VehicleType> = self
            .vehicle_types
            .iter()
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    fn vehicle_type_name_exists(&self, name: &str) -> bool {
        self.vehicle_types.iter().any(|e| e.value().name == name)
    }

    fn vehicle_type_count(&self) -> usize {
        self.vehicle_types.len()
    }

    fn save_vehicle_type(&self, vehicle_type: VehicleType) {
        self.vehicle_types.insert(vehicle_type.id, vehicle_type);
    }
}

impl SlotStore for InMemoryStore {
    fn slot(&self, id: &Ulid) -> Option<Slot> {
        self.slots.get(id).map(|e| e.value().clone())
    }

    fn slots(&self) -> Vec<Slot> {
        self.sorted_slots(|_| true)
    }

    fn slots_by_floor(&self, floor_id: &Ulid) -> Vec<Slot> {
        self.sorted_slots(|s| s.floor_id == *floor_id)
    }

    fn slots_by_vehicle_type(&self, vehicle_type_id: &Ulid) -> Vec<Slot> {
        self.sorted_slots(|s| s.vehicle_type_id == *vehicle_type_id)
    }

    fn slot_number_exists(&self, slot_number: &str, floor_id: &Ulid) -> bool {
        self.slots
            .iter()
            .any(|e| e.value().floor_id == *floor_id && e.value().slot_number == slot_number)
    }

    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn save_slot(&self, slot: Slot) {
        self.slots.insert(slot.id, slot);
    }

    fn delete_slot(&self, id: &Ulid) -> Option<Slot> {
        let (_, slot) = self.slots.remove(id)?;
        self.slot_schedules.remove(id);
        let ids = self
            .slot_reservations
            .remove(id)
            .map(|(_, ids)| ids)
            .unwrap_or_default();
        for rid in ids {
            if let Some((_, r)) = self.reservations.remove(&rid)
                && r.is_active()
            {
                self.unindex_active(&r);
            }
        }
        Some(slot)
    }
}

impl ReservationStore for InMemoryStore {
    fn get_any(&self, id: &Ulid) -> Option<Reservation> {
        self.reservations.get(id).map(|e| e.value().clone())
    }

    fn get_active(&self, id: &Ulid) -> Option<Reservation> {
        self.get_any(id).filter(Reservation::is_active)
    }

    fn save_reservation(&self, reservation: Reservation) {
        let previous = self.reservations.insert(reservation.id, reservation.clone());
        match &previous {
            Some(prev) if prev.is_active() => self.unindex_active(prev),
            Some(_) => {}
            None => self
                .slot_reservations
                .entry(reservation.slot_id)
                .or_default()
                .push(reservation.id),
        }
        if reservation.is_active() {
            self.index_active(&reservation);
        }
    }

    fn list_active(&self) -> Vec<Reservation> {
        self.sorted_reservations(Reservation::is_active)
    }

    fn list_all(&self) -> Vec<Reservation> {
        self.sorted_reservations(|_| true)
    }

    fn reservations_for_slot(&self, slot_id: &Ulid) -> Vec<Reservation> {
        let ids = self
            .slot_reservations
            .get(slot_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        self.resolve(ids)
    }

    fn find_active_overlaps(&self, slot_id: &Ulid, span: &Span) -> Vec<Reservation> {
        let ids: Vec<Ulid> = match self.slot_schedules.get(slot_id) {
            Some(sched) => sched.overlapping(span).map(|(id, _)| *id).collect(),
            None => return Vec::new(),
        };
        self.resolve(ids)
    }

    fn find_active_overlaps_for_vehicle(
        &self,
        vehicle_number: &str,
        span: &Span,
    ) -> Vec<Reservation> {
        let ids: Vec<Ulid> = match self.vehicle_schedules.get(vehicle_number) {
            Some(sched) => sched.overlapping(span).map(|(id, _)| *id).collect(),
            None => return Vec::new(),
        };
        self.resolve(ids)
    }

    fn find_available_slots(&self, span: &Span, vehicle_type_id: Option<&Ulid>) -> Vec<Slot> {
        self.sorted_slots(|s| {
            s.is_available
                && vehicle_type_id.is_none_or(|vt| s.vehicle_type_id == *vt)
                && self.slot_is_free(&s.id, span)
        })
    }
}
