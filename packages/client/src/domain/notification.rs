//! Typed notifications fanned out after each inbound message.
//!
//! The reducer produces these next to the new snapshot. Kinds that do not
//! touch the snapshot (metrics, search results, typing...) exist only here.

use std::sync::Arc;

use serde_json::Value;

use super::reservation::{ConversationMessage, CustomerKey, Reservation, VacationPeriod};

/// What happened to a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationChange {
    Created,
    Updated,
    Reinstated,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The whole snapshot was replaced
    SnapshotReplaced,
    /// A single reservation was added or changed
    ReservationChanged {
        change: ReservationChange,
        reservation: Reservation,
        previous: Option<Reservation>,
    },
    /// The vacation list was replaced
    VacationPeriodsChanged(Arc<Vec<VacationPeriod>>),
    /// A message was appended to a conversation thread
    NewConversationMessage {
        customer_key: CustomerKey,
        message: ConversationMessage,
    },
    MetricsUpdated(Value),
    CustomerUpdated(Value),
    CustomerSearchResults(Value),
    CustomerDocumentUpdated(Value),
    NotificationsHistory(Value),
    Typing {
        customer_key: Option<CustomerKey>,
        typing: bool,
    },
}
