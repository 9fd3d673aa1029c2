//! Payload validation.
//!
//! Every inbound payload goes through here before it may touch the snapshot.
//! Reservations and conversation messages that fail validation are still
//! accepted through a lenient decode (flagged `verified = false`); snapshots and
//! vacation lists that fail are rejected.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::{
    domain::{
        ConversationMessage, CustomerKey, Reservation, ReservationId, ReservationType,
        VacationPeriod,
        slot::{parse_date, parse_raw_time},
    },
    error::SchemaError,
    infrastructure::dto::websocket::{ConversationMessageDto, ReservationDto, SnapshotDto},
};

const RESERVATION_FIELDS: [&str; 7] = [
    "id",
    "customer_key",
    "date",
    "time_slot",
    "type",
    "cancelled",
    "display_name",
];

const CONVERSATION_FIELDS: [&str; 5] = ["customer_key", "role", "message", "date", "time"];

/// Validated content of a `snapshot` message
#[derive(Debug, Clone, Default)]
pub struct SnapshotPayload {
    pub reservations: HashMap<CustomerKey, Vec<Reservation>>,
    pub conversations: HashMap<CustomerKey, Vec<ConversationMessage>>,
    pub vacation_periods: Vec<VacationPeriod>,
}

pub fn payload_reservation_id(data: &Value) -> Option<ReservationId> {
    data.get("id").and_then(ReservationId::from_value)
}

pub fn payload_customer_key(data: &Value) -> Option<CustomerKey> {
    data.get("customer_key").and_then(CustomerKey::from_value)
}

/// Strictly validate a reservation payload.
///
/// `routing_key` is the customer the reservation is filed under; when it is
/// `None` the payload's own `customer_key` is used.
pub fn validate_reservation(
    data: &Value,
    routing_key: Option<&CustomerKey>,
) -> Result<Reservation, SchemaError> {
    let dto: ReservationDto = serde_json::from_value(data.clone())?;
    let key = routing_key
        .cloned()
        .or_else(|| dto.customer_key.clone())
        .ok_or(SchemaError::MissingField("customer_key"))?;
    if parse_date(&dto.date).is_none() {
        return Err(SchemaError::InvalidDate {
            field: "date",
            value: dto.date,
        });
    }
    parse_raw_time(&dto.time_slot).map_err(|_| SchemaError::InvalidTime(dto.time_slot.clone()))?;
    Ok(dto.into_reservation(key))
}

/// Decode whatever can be read from a reservation payload.
///
/// Only an id and a customer are required; without them the reservation
/// cannot be filed and `None` is returned.
pub fn lenient_reservation(data: &Value, routing_key: Option<&CustomerKey>) -> Option<Reservation> {
    let object = data.as_object()?;
    let id = object.get("id").and_then(ReservationId::from_value)?;
    let customer_key = routing_key
        .cloned()
        .or_else(|| object.get("customer_key").and_then(CustomerKey::from_value))?;
    let reservation_type = object
        .get("type")
        .and_then(Value::as_u64)
        .and_then(|n| u8::try_from(n).ok())
        .and_then(|n| ReservationType::try_from(n).ok())
        .unwrap_or(ReservationType::CheckUp);

    Some(Reservation {
        id,
        customer_key,
        date: text_field(object, "date"),
        time_slot: text_field(object, "time_slot"),
        reservation_type,
        cancelled: object
            .get("cancelled")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        display_name: text_field(object, "display_name"),
        extra: unknown_fields(object, &RESERVATION_FIELDS),
        verified: false,
    })
}

/// Validate a reservation, falling back to the lenient decode on failure
pub fn accept_reservation(data: &Value, routing_key: Option<&CustomerKey>) -> Option<Reservation> {
    match validate_reservation(data, routing_key) {
        Ok(reservation) => Some(reservation),
        Err(e) => {
            let fallback = lenient_reservation(data, routing_key);
            tracing::warn!(
                "Reservation payload failed validation ({}); {}",
                e,
                if fallback.is_some() {
                    "keeping unverified payload"
                } else {
                    "payload has no id or customer, dropping"
                }
            );
            fallback
        }
    }
}

/// Apply a cancellation payload on top of an existing reservation.
///
/// The payload's fields overwrite the current ones (except the customer,
/// which stays where the reservation is filed) and `cancelled` is forced on.
pub fn merge_cancellation(current: &Reservation, patch: &Value) -> Reservation {
    let mut merged = match serde_json::to_value(current) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    if let Some(patch) = patch.as_object() {
        for (field, value) in patch {
            if field != "customer_key" {
                merged.insert(field.clone(), value.clone());
            }
        }
    }
    merged.insert("cancelled".to_string(), Value::Bool(true));
    let merged = Value::Object(merged);

    match validate_reservation(&merged, Some(&current.customer_key)) {
        Ok(reservation) => reservation,
        Err(e) => {
            tracing::warn!("Cancelled reservation '{}' failed validation: {}", current.id, e);
            lenient_reservation(&merged, Some(&current.customer_key)).unwrap_or_else(|| {
                Reservation {
                    cancelled: true,
                    ..current.clone()
                }
            })
        }
    }
}

pub fn validate_conversation_message(
    data: &Value,
    routing_key: Option<&CustomerKey>,
) -> Result<ConversationMessage, SchemaError> {
    let dto: ConversationMessageDto = serde_json::from_value(data.clone())?;
    let key = routing_key
        .cloned()
        .or_else(|| dto.customer_key.clone())
        .ok_or(SchemaError::MissingField("customer_key"))?;
    if dto.role.trim().is_empty() {
        return Err(SchemaError::MissingField("role"));
    }
    Ok(dto.into_message(key))
}

pub fn lenient_conversation_message(data: &Value, customer_key: &CustomerKey) -> ConversationMessage {
    let empty = Map::new();
    let object = data.as_object().unwrap_or(&empty);
    ConversationMessage {
        customer_key: customer_key.clone(),
        role: text_field(object, "role"),
        message: match (object.get("message"), data) {
            (Some(_), _) => text_field(object, "message"),
            (None, Value::String(text)) => text.clone(),
            (None, Value::Object(_) | Value::Null) => String::new(),
            (None, other) => other.to_string(),
        },
        date: object.get("date").and_then(Value::as_str).map(str::to_string),
        time: object.get("time").and_then(Value::as_str).map(str::to_string),
        extra: unknown_fields(object, &CONVERSATION_FIELDS),
        verified: false,
    }
}

/// Validate a conversation message, falling back to the lenient decode
pub fn accept_conversation_message(data: &Value, customer_key: &CustomerKey) -> ConversationMessage {
    validate_conversation_message(data, Some(customer_key)).unwrap_or_else(|e| {
        tracing::warn!(
            "Conversation message for '{}' failed validation ({}); keeping unverified payload",
            customer_key,
            e
        );
        lenient_conversation_message(data, customer_key)
    })
}

/// Validate a vacation list, sent either as a bare array or as `{periods: [...]}`
pub fn validate_vacation_periods(data: &Value) -> Result<Vec<VacationPeriod>, SchemaError> {
    let items = match data {
        Value::Array(items) => items,
        Value::Object(object) => match object.get("periods") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(SchemaError::InvalidShape(
                    "'periods' must be an array".to_string(),
                ));
            }
            None => return Err(SchemaError::MissingField("periods")),
        },
        _ => {
            return Err(SchemaError::InvalidShape(
                "vacation periods must be an array or an object".to_string(),
            ));
        }
    };

    items
        .iter()
        .map(|item| {
            let period: VacationPeriod = serde_json::from_value(item.clone())?;
            if period.start > period.end {
                return Err(SchemaError::InvalidPeriod {
                    start: period.start.to_string(),
                    end: period.end.to_string(),
                });
            }
            Ok(period)
        })
        .collect()
}

/// Validate a full snapshot.
///
/// The overall structure must be right; individual reservations go through
/// `accept_reservation`, and duplicate ids within one customer collapse into
/// one entry.
pub fn validate_snapshot(data: &Value) -> Result<SnapshotPayload, SchemaError> {
    let dto: SnapshotDto = serde_json::from_value(data.clone())?;

    let vacation_periods = match &dto.vacation_periods {
        Value::Null => Vec::new(),
        other => validate_vacation_periods(other)?,
    };

    let mut reservations = HashMap::with_capacity(dto.reservations.len());
    for (raw_key, items) in dto.reservations {
        let key = CustomerKey::new(raw_key);
        let mut list: Vec<Reservation> = Vec::with_capacity(items.len());
        for item in &items {
            let Some(reservation) = accept_reservation(item, Some(&key)) else {
                continue;
            };
            match list.iter().position(|r| r.id == reservation.id) {
                Some(idx) => list[idx] = reservation,
                None => list.push(reservation),
            }
        }
        reservations.insert(key, list);
    }

    let conversations = dto
        .conversations
        .into_iter()
        .map(|(raw_key, items)| {
            let key = CustomerKey::new(raw_key);
            let thread = items
                .iter()
                .map(|item| accept_conversation_message(item, &key))
                .collect();
            (key, thread)
        })
        .collect();

    Ok(SnapshotPayload {
        reservations,
        conversations,
        vacation_periods,
    })
}

fn text_field(object: &Map<String, Value>, field: &str) -> String {
    match object.get(field) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn unknown_fields(object: &Map<String, Value>, known: &[&str]) -> Map<String, Value> {
    object
        .iter()
        .filter(|(field, _)| !known.contains(&field.as_str()))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}
