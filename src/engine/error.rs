use ulid::Ulid;

use crate::model::Ms;

/// Coarse classification the boundary layer maps to outward signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; the caller must correct it. Never retried.
    Validation,
    NotFound,
    /// The request clashes with current state (occupied, duplicate, terminal).
    Conflict,
    /// Anything else, typically storage. Details stay in the logs.
    Unexpected,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid span [{start}, {end}): start must be before end")]
    InvalidSpan { start: Ms, end: Ms },

    #[error("span of {duration_ms}ms exceeds the {max_ms}ms maximum")]
    SpanTooLong { duration_ms: Ms, max_ms: Ms },

    #[error("vehicle number {0:?} must be in format XX00XX0000 or XX00X0000")]
    InvalidVehicleNumber(String),

    #[error("reservation {0} has already started and cannot be cancelled")]
    AlreadyStarted(Ulid),

    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("slot {slot_id} is already reserved for the requested time by {reservation_id}")]
    SlotOccupied { slot_id: Ulid, reservation_id: Ulid },

    #[error("vehicle {vehicle_number} already has reservation {reservation_id} during this time")]
    VehicleDoubleBooked {
        vehicle_number: String,
        reservation_id: Ulid,
    },

    #[error("slot {0} is not available for reservation")]
    SlotDisabled(Ulid),

    #[error("reservation {0} is already cancelled")]
    AlreadyCancelled(Ulid),

    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn duplicate(entity: &'static str, key: impl ToString) -> Self {
        EngineError::Duplicate {
            entity,
            key: key.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidSpan { .. }
            | EngineError::SpanTooLong { .. }
            | EngineError::InvalidVehicleNumber(_)
            | EngineError::AlreadyStarted(_)
            | EngineError::InvalidField { .. }
            | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::SlotOccupied { .. }
            | EngineError::VehicleDoubleBooked { .. }
            | EngineError::SlotDisabled(_)
            | EngineError::AlreadyCancelled(_)
            | EngineError::Duplicate { .. } => ErrorKind::Conflict,
            EngineError::WalError(_) => ErrorKind::Unexpected,
        }
    }

    /// Message safe to hand to a caller: unexpected failures are reduced
    /// to a generic line.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Unexpected => {
                "An unexpected error occurred. Please try again later.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
