use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, Store};

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// `start < end`, both inside the supported timestamp range, at most 24h long.
pub(crate) fn validate_reservation_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::InvalidSpan {
            start: span.start,
            end: span.end,
        });
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_RESERVATION_SPAN_MS {
        return Err(EngineError::SpanTooLong {
            duration_ms: span.duration_ms(),
            max_ms: MAX_RESERVATION_SPAN_MS,
        });
    }
    Ok(())
}

/// First active reservation on `slot_id` overlapping `span`, by start time.
pub(crate) fn slot_blocker<S: Store>(store: &S, slot_id: &Ulid, span: &Span) -> Option<Ulid> {
    store
        .find_active_overlaps(slot_id, span)
        .into_iter()
        .min_by_key(|r| (r.span.start, r.id))
        .map(|r| r.id)
}

/// First active reservation held by `vehicle_number` overlapping `span`, on any slot.
pub(crate) fn vehicle_blocker<S: Store>(
    store: &S,
    vehicle_number: &str,
    span: &Span,
) -> Option<Ulid> {
    store
        .find_active_overlaps_for_vehicle(vehicle_number, span)
        .into_iter()
        .min_by_key(|r| (r.span.start, r.id))
        .map(|r| r.id)
}

pub(crate) fn check_slot_conflict<S: Store>(
    store: &S,
    slot_id: Ulid,
    span: &Span,
) -> Result<(), EngineError> {
    match slot_blocker(store, &slot_id, span) {
        Some(reservation_id) => Err(EngineError::SlotOccupied {
            slot_id,
            reservation_id,
        }),
        None => Ok(()),
    }
}

pub(crate) fn check_vehicle_conflict<S: Store>(
    store: &S,
    vehicle_number: &str,
    span: &Span,
) -> Result<(), EngineError> {
    match vehicle_blocker(store, vehicle_number, span) {
        Some(reservation_id) => Err(EngineError::VehicleDoubleBooked {
            vehicle_number: vehicle_number.to_string(),
            reservation_id,
        }),
        None => Ok(()),
    }
}

impl<S: Store> Engine<S> {
    /// Whether an active reservation on `slot_id` overlaps `span`.
    /// Unlocked read; a create re-checks under the slot lock.
    pub fn has_slot_conflict(&self, slot_id: Ulid, span: &Span) -> bool {
        slot_blocker(self.store(), &slot_id, span).is_some()
    }

    /// Whether `vehicle_number` holds an active reservation overlapping `span` on any slot.
    pub fn has_vehicle_conflict(&self, vehicle_number: &str, span: &Span) -> bool {
        vehicle_blocker(self.store(), vehicle_number, span).is_some()
    }
}
