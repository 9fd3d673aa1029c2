//! WebSocket message DTOs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{CustomerKey, ReservationId, ReservationType},
    error::SchemaError,
};

/// Inbound message kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Snapshot,
    ReservationCreated,
    ReservationUpdated,
    ReservationReinstated,
    ReservationCancelled,
    ConversationNewMessage,
    VacationPeriodUpdated,
    MetricsUpdated,
    CustomerUpdated,
    CustomerSearchResults,
    CustomerDocumentUpdated,
    NotificationsHistory,
    ConversationTyping,
    /// Anything else; ignored by the reducer
    Unknown(String),
}

impl MessageKind {
    pub fn from_type(value: &str) -> Self {
        match value {
            "snapshot" => MessageKind::Snapshot,
            "reservation_created" => MessageKind::ReservationCreated,
            "reservation_updated" => MessageKind::ReservationUpdated,
            "reservation_reinstated" => MessageKind::ReservationReinstated,
            "reservation_cancelled" => MessageKind::ReservationCancelled,
            "conversation_new_message" => MessageKind::ConversationNewMessage,
            "vacation_period_updated" => MessageKind::VacationPeriodUpdated,
            "metrics_updated" => MessageKind::MetricsUpdated,
            "customer_updated" => MessageKind::CustomerUpdated,
            "customer_search_results" => MessageKind::CustomerSearchResults,
            "customer_document_updated" => MessageKind::CustomerDocumentUpdated,
            "notifications_history" => MessageKind::NotificationsHistory,
            "conversation_typing" => MessageKind::ConversationTyping,
            other => MessageKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Snapshot => "snapshot",
            MessageKind::ReservationCreated => "reservation_created",
            MessageKind::ReservationUpdated => "reservation_updated",
            MessageKind::ReservationReinstated => "reservation_reinstated",
            MessageKind::ReservationCancelled => "reservation_cancelled",
            MessageKind::ConversationNewMessage => "conversation_new_message",
            MessageKind::VacationPeriodUpdated => "vacation_period_updated",
            MessageKind::MetricsUpdated => "metrics_updated",
            MessageKind::CustomerUpdated => "customer_updated",
            MessageKind::CustomerSearchResults => "customer_search_results",
            MessageKind::CustomerDocumentUpdated => "customer_document_updated",
            MessageKind::NotificationsHistory => "notifications_history",
            MessageKind::ConversationTyping => "conversation_typing",
            MessageKind::Unknown(other) => other,
        }
    }
}

/// Raw inbound frame: `{type, data, timestamp}`
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub r#type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub timestamp: Value,
}

/// Parsed inbound message handed to the reducer
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub data: Value,
    pub timestamp: Option<String>,
}

impl InboundMessage {
    pub fn new(kind: MessageKind, data: Value) -> Self {
        Self {
            kind,
            data,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Parse one text frame
    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        let frame: InboundFrame = serde_json::from_str(text)?;
        Ok(frame.into())
    }
}

/// Outbound frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl OutboundMessage {
    fn bare(kind: &str) -> Self {
        Self {
            r#type: kind.to_string(),
            filters: None,
            data: None,
        }
    }

    pub fn set_filter(filters: Value) -> Self {
        Self {
            filters: Some(filters),
            ..Self::bare("set_filter")
        }
    }

    pub fn get_snapshot() -> Self {
        Self::bare("get_snapshot")
    }

    pub fn ping() -> Self {
        Self::bare("ping")
    }

    /// A local mutation such as `modify_reservation`
    pub fn mutation(kind: &str, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::bare(kind)
        }
    }

    pub fn is_ping(&self) -> bool {
        self.r#type == "ping"
    }
}

/// `reservation_*` payload
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationDto {
    pub id: ReservationId,
    #[serde(default)]
    pub customer_key: Option<CustomerKey>,
    pub date: String,
    pub time_slot: String,
    #[serde(rename = "type")]
    pub reservation_type: ReservationType,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `conversation_new_message` payload
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationMessageDto {
    #[serde(default)]
    pub customer_key: Option<CustomerKey>,
    pub role: String,
    pub message: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `snapshot` payload; lists are validated one entry at a time
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotDto {
    pub reservations: HashMap<String, Vec<Value>>,
    #[serde(default)]
    pub conversations: HashMap<String, Vec<Value>>,
    #[serde(default)]
    pub vacation_periods: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_recognised_frame() {
        // テスト項目: 既知の type を持つフレームが対応する MessageKind に変換される
        // given (前提条件):
        let text = r#"{"type":"reservation_created","data":{"id":1},"timestamp":"2024-05-01T10:00:00Z"}"#;

        // when (操作):
        let message = InboundMessage::parse(text).unwrap();

        // then (期待する結果):
        assert_eq!(message.kind, MessageKind::ReservationCreated);
        assert_eq!(message.data, json!({"id": 1}));
        assert_eq!(message.timestamp.as_deref(), Some("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn test_parse_unknown_type_is_kept_as_unknown() {
        // テスト項目: 未知の type はエラーではなく Unknown として扱われる
        // given (前提条件):
        let text = r#"{"type":"pong"}"#;

        // when (操作):
        let message = InboundMessage::parse(text).unwrap();

        // then (期待する結果):
        assert_eq!(message.kind, MessageKind::Unknown("pong".to_string()));
        assert_eq!(message.data, Value::Null);
        assert_eq!(message.timestamp, None);
    }

    #[test]
    fn test_parse_numeric_timestamp() {
        // テスト項目: 数値のタイムスタンプも文字列として保持される
        // given (前提条件):
        let text = r#"{"type":"metrics_updated","data":{},"timestamp":1714557600000}"#;

        // when (操作):
        let message = InboundMessage::parse(text).unwrap();

        // then (期待する結果):
        assert_eq!(message.timestamp.as_deref(), Some("1714557600000"));
    }

    #[test]
    fn test_parse_rejects_frame_without_type() {
        // テスト項目: type を持たないフレームはパースエラーになる
        // given (前提条件):
        let text = r#"{"data":{}}"#;

        // when (操作):
        let result = InboundMessage::parse(text);

        // then (期待する結果):
        assert!(matches!(result, Err(SchemaError::InvalidShape(_))));
    }

    #[test]
    fn test_message_kind_round_trips_type_names() {
        // テスト項目: すべての既知の type 名が MessageKind と相互変換できる
        // given (前提条件):
        let names = [
            "snapshot",
            "reservation_created",
            "reservation_updated",
            "reservation_reinstated",
            "reservation_cancelled",
            "conversation_new_message",
            "vacation_period_updated",
            "metrics_updated",
            "customer_updated",
            "customer_search_results",
            "customer_document_updated",
            "notifications_history",
            "conversation_typing",
        ];

        for name in names {
            // when (操作):
            let kind = MessageKind::from_type(name);

            // then (期待する結果):
            assert!(!matches!(kind, MessageKind::Unknown(_)), "{}", name);
            assert_eq!(kind.as_str(), name);
        }
    }

    #[test]
    fn test_outbound_frames_serialize_without_empty_fields() {
        // テスト項目: 送信フレームは不要なフィールドを含まずに JSON 化される
        // given (前提条件):
        let filter = OutboundMessage::set_filter(json!({"date": "2024-05-01"}));
        let snapshot = OutboundMessage::get_snapshot();
        let mutation = OutboundMessage::mutation("modify_reservation", json!({"id": "7"}));

        // when (操作):
        let filter_json = serde_json::to_value(&filter).unwrap();
        let snapshot_json = serde_json::to_value(&snapshot).unwrap();
        let mutation_json = serde_json::to_value(&mutation).unwrap();

        // then (期待する結果):
        assert_eq!(
            filter_json,
            json!({"type": "set_filter", "filters": {"date": "2024-05-01"}})
        );
        assert_eq!(snapshot_json, json!({"type": "get_snapshot"}));
        assert_eq!(
            mutation_json,
            json!({"type": "modify_reservation", "data": {"id": "7"}})
        );
        assert!(OutboundMessage::ping().is_ping());
    }
}
