//! Error types for the reservation client.

use thiserror::Error;

/// Connection-level errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// The stream could not be established
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A frame could not be written to the stream
    #[error("Send error: {0}")]
    SendError(String),

    /// The configured filter is not valid JSON
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

/// Payload validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// The payload does not have the expected structure
    #[error("Invalid payload shape: {0}")]
    InvalidShape(String),

    /// A required field is absent
    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    /// A date field does not parse as `YYYY-MM-DD`
    #[error("Invalid date in '{field}': {value}")]
    InvalidDate { field: &'static str, value: String },

    /// A time field does not parse as a time of day
    #[error("Invalid time slot: {0}")]
    InvalidTime(String),

    /// A vacation period ends before it starts
    #[error("Vacation period ends before it starts: {start} > {end}")]
    InvalidPeriod { start: String, end: String },
}

impl From<serde_json::Error> for SchemaError {
    fn from(e: serde_json::Error) -> Self {
        SchemaError::InvalidShape(e.to_string())
    }
}

/// Slot computation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    /// The raw time of day is not in a recognised format
    #[error("Unrecognised time of day: '{0}'")]
    InvalidTime(String),

    /// The computed minute offset does not fit in a day
    #[error("Minute offset {0} is outside of the day")]
    OutOfRange(u32),
}

/// Render surface mutation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    /// No event with this id is on the surface
    #[error("Event '{0}' is not on the surface")]
    UnknownEvent(String),

    /// The surface refused the mutation
    #[error("Surface rejected update of '{id}': {reason}")]
    Rejected { id: String, reason: String },
}
