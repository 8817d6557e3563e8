use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;

/// Half-open interval `[start, end)`.
///
/// Two reservations that touch (one ends exactly when the next starts) do
/// not overlap. Conflict detection and availability both go through
/// [`Span::overlaps`], so there is one rule for the whole engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Floor {
    pub id: Ulid,
    pub number: i32,
    pub name: String,
    pub total_slots: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleType {
    pub id: Ulid,
    pub name: String,
    pub hourly_rate: Decimal,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Ulid,
    pub slot_number: String,
    pub floor_id: Ulid,
    pub vehicle_type_id: Ulid,
    /// Administrative switch, independent of time-based occupancy.
    pub is_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Active,
    /// Terminal.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub slot_id: Ulid,
    pub vehicle_number: String,
    pub span: Span,
    pub total_cost: Decimal,
    pub duration_hours: u32,
    pub status: ReservationStatus,
    pub created_at: Ms,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

/// Active reservations on one key (a slot or a vehicle), sorted by `span.start`.
///
/// Only active reservations live here; cancelling removes the entry, so the
/// schedule is exactly the set the overlap invariants talk about.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    entries: Vec<(Ulid, Span)>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, id: Ulid, span: Span) {
        let pos = self
            .entries
            .binary_search_by_key(&span.start, |(_, s)| s.start)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, (id, span));
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Span> {
        let pos = self.entries.iter().position(|(eid, _)| *eid == id)?;
        Some(self.entries.remove(pos).1)
    }

    /// Entries whose span overlaps the query window.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &(Ulid, Span)> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.entries.partition_point(|(_, s)| s.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |(_, s)| s.end > query.start)
    }
}

/// The WAL record format. Created events carry the full record so replay
/// and compaction never have to recompute prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    FloorCreated(Floor),
    FloorDeleted { id: Ulid },
    VehicleTypeCreated(VehicleType),
    SlotCreated(Slot),
    SlotAvailabilityChanged { id: Ulid, is_available: bool },
    SlotDeleted { id: Ulid },
    ReservationCreated(Reservation),
    ReservationCancelled { id: Ulid, slot_id: Ulid },
}

// ── Query result types ───────────────────────────────────────────

/// A slot that is free for a requested window, joined with its floor and
/// vehicle type for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableSlot {
    pub slot_id: Ulid,
    pub slot_number: String,
    pub floor_id: Ulid,
    pub floor_number: i32,
    pub vehicle_type_id: Ulid,
    pub vehicle_type: String,
    pub hourly_rate: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub span: Span,
    pub vehicle_type_id: Option<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub slot_id: Ulid,
    pub vehicle_number: String,
    pub span: Span,
}
