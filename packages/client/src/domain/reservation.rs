//! Reservation, conversation and vacation entities.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Customer routing key (one reservation list and one thread per customer)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerKey(String);

impl CustomerKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read a key from a JSON value. Empty strings are not keys.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for CustomerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reservation identifier.
///
/// The server sends numeric ids, older payloads send strings; both end up as
/// the same textual id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ReservationId(String);

impl ReservationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ReservationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        ReservationId::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid reservation id: {}", value)))
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Appointment type. The numeric value is the wire value and the sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReservationType {
    CheckUp = 0,
    FollowUp = 1,
}

impl TryFrom<u8> for ReservationType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReservationType::CheckUp),
            1 => Ok(ReservationType::FollowUp),
            other => Err(format!("unknown reservation type {}", other)),
        }
    }
}

impl From<ReservationType> for u8 {
    fn from(value: ReservationType) -> Self {
        value as u8
    }
}

/// A reservation as held in the snapshot.
///
/// `date` and `time_slot` keep the server's raw text; the slot engine parses
/// them when it needs to. Fields the client does not know about are carried in
/// `extra` so merges never lose data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub customer_key: CustomerKey,
    pub date: String,
    pub time_slot: String,
    #[serde(rename = "type")]
    pub reservation_type: ReservationType,
    pub cancelled: bool,
    pub display_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// `false` when the payload failed validation and was accepted as-is
    #[serde(skip)]
    pub verified: bool,
}

impl Reservation {
    /// Title used on the calendar
    pub fn title(&self) -> &str {
        if self.display_name.is_empty() {
            self.customer_key.as_str()
        } else {
            &self.display_name
        }
    }
}

/// One message of a customer's conversation thread. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMessage {
    pub customer_key: CustomerKey,
    pub role: String,
    pub message: String,
    pub date: Option<String>,
    pub time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(skip)]
    pub verified: bool,
}

/// A closed date range during which no reservations are taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacationPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl VacationPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}
