use ulid::Ulid;

use crate::model::{BookingStatus, DateKey, ParseError, TimeOfDay};

#[derive(Debug)]
pub enum EngineError {
    /// Capacity exhausted at validation time; pick another time.
    SlotFull {
        date: DateKey,
        time: TimeOfDay,
        capacity: u32,
    },
    DayNotBookable(DateKey),
    SlotNotOffered {
        date: DateKey,
        time: TimeOfDay,
    },
    /// Only escalated when no snapshot has ever been obtained, or when a
    /// write to the remote is required and fails.
    RemoteFetchFailed(String),
    NotFound(Ulid),
    /// Remote-origin bookings cannot be mutated by the client.
    ReadOnly(Ulid),
    InvalidTransition {
        id: Ulid,
        from: BookingStatus,
        to: BookingStatus,
    },
    InvalidInput(String),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::SlotFull {
                date,
                time,
                capacity,
            } => write!(f, "slot {date} {time} is full (capacity {capacity})"),
            EngineError::DayNotBookable(date) => write!(f, "day {date} does not accept bookings"),
            EngineError::SlotNotOffered { date, time } => {
                write!(f, "no bookable slot at {date} {time}")
            }
            EngineError::RemoteFetchFailed(e) => write!(f, "remote fetch failed: {e}"),
            EngineError::NotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::ReadOnly(id) => write!(f, "booking {id} is owned by the remote system"),
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "booking {id} cannot go from {from} to {to}")
            }
            EngineError::InvalidInput(e) => write!(f, "invalid input: {e}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ParseError> for EngineError {
    fn from(e: ParseError) -> Self {
        EngineError::InvalidInput(e.to_string())
    }
}
