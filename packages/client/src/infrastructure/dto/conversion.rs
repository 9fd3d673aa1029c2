//! Conversion logic between DTOs and domain entities.

use serde_json::Value;

use crate::domain::{ConversationMessage, CustomerKey, Reservation};
use crate::infrastructure::dto::websocket as dto;

// ========================================
// DTO → Domain Entity
// ========================================

impl From<dto::InboundFrame> for dto::InboundMessage {
    fn from(frame: dto::InboundFrame) -> Self {
        let timestamp = match frame.timestamp {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
        Self {
            kind: dto::MessageKind::from_type(&frame.r#type),
            data: frame.data,
            timestamp,
        }
    }
}

impl dto::ReservationDto {
    /// Build a verified reservation routed to `customer_key`
    pub fn into_reservation(self, customer_key: CustomerKey) -> Reservation {
        Reservation {
            id: self.id,
            customer_key,
            date: self.date.trim().to_string(),
            time_slot: self.time_slot.trim().to_string(),
            reservation_type: self.reservation_type,
            cancelled: self.cancelled,
            display_name: self.display_name.unwrap_or_default(),
            extra: self.extra,
            verified: true,
        }
    }
}

impl dto::ConversationMessageDto {
    pub fn into_message(self, customer_key: CustomerKey) -> ConversationMessage {
        ConversationMessage {
            customer_key,
            role: self.role,
            message: self.message,
            date: self.date,
            time: self.time,
            extra: self.extra,
            verified: true,
        }
    }
}
