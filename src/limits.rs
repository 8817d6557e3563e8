use crate::model::{HOUR_MS, Ms};

/// Longest reservation a single request may book.
pub const MAX_RESERVATION_SPAN_MS: Ms = 24 * HOUR_MS;

/// Widest window an availability query may scan (31 days).
pub const MAX_QUERY_WINDOW_MS: Ms = 31 * 24 * HOUR_MS;

/// 2000-01-01T00:00:00Z .. 2100-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

pub const MAX_FLOORS: usize = 1_000;
pub const MAX_SLOTS: usize = 100_000;
pub const MAX_VEHICLE_TYPES: usize = 256;

pub const MAX_NAME_LEN: usize = 128;
pub const MAX_DESCRIPTION_LEN: usize = 1_024;
pub const MAX_SLOT_NUMBER_LEN: usize = 32;

pub const MAX_PAGE_SIZE: usize = 500;

/// Largest encoded WAL entry replay will read. A length prefix above this
/// is treated as a corrupt tail.
pub const MAX_WAL_ENTRY_BYTES: usize = 1 << 20;
