use std::collections::HashMap;
use std::time::Instant;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::OPERATION_DURATION_SECONDS;

use super::{Engine, EngineError, Store};

/// A query window must be non-empty, inside the supported timestamp range,
/// and no wider than [`MAX_QUERY_WINDOW_MS`].
pub(crate) fn validate_query_window(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::InvalidSpan {
            start: span.start,
            end: span.end,
        });
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

/// Slice `items` to `[offset, offset + limit)`, with `limit` capped at
/// [`MAX_PAGE_SIZE`]. Out-of-range offsets give an empty page.
pub(crate) fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    let limit = limit.min(MAX_PAGE_SIZE);
    items.into_iter().skip(offset).take(limit).collect()
}

impl<S: Store> Engine<S> {
    /// Enabled slots matching the vehicle-type filter with no active
    /// reservation overlapping the window, ordered by slot id.
    ///
    /// An unknown vehicle type simply matches nothing.
    pub fn find_available(
        &self,
        query: &AvailabilityQuery,
    ) -> Result<Vec<AvailableSlot>, EngineError> {
        let started = Instant::now();
        validate_query_window(&query.span)?;

        let store = self.store();
        let slots = store.find_available_slots(&query.span, query.vehicle_type_id.as_ref());

        let floors: HashMap<Ulid, Floor> =
            store.floors().into_iter().map(|f| (f.id, f)).collect();
        let vehicle_types: HashMap<Ulid, VehicleType> = store
            .vehicle_types()
            .into_iter()
            .map(|vt| (vt.id, vt))
            .collect();

        let available: Vec<AvailableSlot> = slots
            .into_iter()
            .filter_map(|slot| {
                // A slot can outlive its parent only mid-cascade; skip it.
                let floor = floors.get(&slot.floor_id)?;
                let vt = vehicle_types.get(&slot.vehicle_type_id)?;
                Some(AvailableSlot {
                    slot_id: slot.id,
                    slot_number: slot.slot_number,
                    floor_id: floor.id,
                    floor_number: floor.number,
                    vehicle_type_id: vt.id,
                    vehicle_type: vt.name.clone(),
                    hourly_rate: vt.hourly_rate,
                })
            })
            .collect();

        metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => "find_available")
            .record(started.elapsed().as_secs_f64());
        Ok(available)
    }

    /// One page of [`find_available`](Self::find_available).
    pub fn find_available_page(
        &self,
        query: &AvailabilityQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<AvailableSlot>, EngineError> {
        Ok(paginate(self.find_available(query)?, offset, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Ms = 1_800_000_000_000;

    #[test]
    fn window_must_be_non_empty() {
        assert!(matches!(
            validate_query_window(&Span { start: BASE, end: BASE }),
            Err(EngineError::InvalidSpan { .. })
        ));
        assert!(matches!(
            validate_query_window(&Span { start: BASE + 1, end: BASE }),
            Err(EngineError::InvalidSpan { .. })
        ));
        assert!(validate_query_window(&Span::new(BASE, BASE + HOUR_MS)).is_ok());
    }

    #[test]
    fn window_width_is_bounded() {
        let widest = Span::new(BASE, BASE + MAX_QUERY_WINDOW_MS);
        assert!(validate_query_window(&widest).is_ok());
        let too_wide = Span::new(BASE, BASE + MAX_QUERY_WINDOW_MS + 1);
        assert!(matches!(
            validate_query_window(&too_wide),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn window_outside_timestamp_range() {
        let ancient = Span::new(0, HOUR_MS);
        assert!(matches!(
            validate_query_window(&ancient),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn paginate_slices_and_caps() {
        let items: Vec<usize> = (0..1_000).collect();
        assert_eq!(paginate(items.clone(), 0, 3), vec![0, 1, 2]);
        assert_eq!(paginate(items.clone(), 998, 10), vec![998, 999]);
        assert!(paginate(items.clone(), 2_000, 10).is_empty());
        assert_eq!(paginate(items, 0, usize::MAX).len(), MAX_PAGE_SIZE);
    }
}
