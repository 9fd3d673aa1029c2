//! State reducer: folds one inbound message into the snapshot.
//!
//! `reduce` never mutates the previous snapshot. When nothing changes it
//! returns the very same `Arc`, so observers can skip recomputation with a
//! pointer comparison. Kinds the snapshot does not model are passed on as
//! notifications only.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    domain::{CustomerKey, Notification, ReservationChange, Snapshot},
    infrastructure::dto::{
        schema,
        websocket::{InboundMessage, MessageKind},
    },
};

/// Result of applying one message
#[derive(Debug, Clone)]
pub struct Transition {
    pub snapshot: Arc<Snapshot>,
    pub notifications: Vec<Notification>,
}

impl Transition {
    fn unchanged(previous: &Arc<Snapshot>) -> Self {
        Self {
            snapshot: Arc::clone(previous),
            notifications: Vec::new(),
        }
    }

    fn notify(previous: &Arc<Snapshot>, notification: Notification) -> Self {
        Self {
            snapshot: Arc::clone(previous),
            notifications: vec![notification],
        }
    }

    fn changed(snapshot: Snapshot, notification: Notification) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            notifications: vec![notification],
        }
    }

    /// Whether the snapshot differs from `previous`
    pub fn is_changed(&self, previous: &Arc<Snapshot>) -> bool {
        !Arc::ptr_eq(&self.snapshot, previous)
    }
}

/// Apply one message to the snapshot
pub fn reduce(previous: &Arc<Snapshot>, message: &InboundMessage) -> Transition {
    match &message.kind {
        MessageKind::Snapshot => replace_snapshot(previous, message),
        MessageKind::ReservationCreated => {
            upsert_reservation(previous, message, ReservationChange::Created)
        }
        MessageKind::ReservationUpdated => {
            upsert_reservation(previous, message, ReservationChange::Updated)
        }
        MessageKind::ReservationReinstated => {
            upsert_reservation(previous, message, ReservationChange::Reinstated)
        }
        MessageKind::ReservationCancelled => cancel_reservation(previous, message),
        MessageKind::ConversationNewMessage => append_conversation_message(previous, message),
        MessageKind::VacationPeriodUpdated => replace_vacation_periods(previous, message),
        MessageKind::MetricsUpdated => Transition::notify(
            previous,
            Notification::MetricsUpdated(message.data.clone()),
        ),
        MessageKind::CustomerUpdated => Transition::notify(
            previous,
            Notification::CustomerUpdated(message.data.clone()),
        ),
        MessageKind::CustomerSearchResults => Transition::notify(
            previous,
            Notification::CustomerSearchResults(message.data.clone()),
        ),
        MessageKind::CustomerDocumentUpdated => Transition::notify(
            previous,
            Notification::CustomerDocumentUpdated(message.data.clone()),
        ),
        MessageKind::NotificationsHistory => Transition::notify(
            previous,
            Notification::NotificationsHistory(message.data.clone()),
        ),
        MessageKind::ConversationTyping => Transition::notify(
            previous,
            Notification::Typing {
                customer_key: schema::payload_customer_key(&message.data),
                typing: message
                    .data
                    .get("typing")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            },
        ),
        MessageKind::Unknown(kind) => {
            tracing::debug!("Ignoring message of unknown type '{}'", kind);
            Transition::unchanged(previous)
        }
    }
}

fn replace_snapshot(previous: &Arc<Snapshot>, message: &InboundMessage) -> Transition {
    match schema::validate_snapshot(&message.data) {
        Ok(payload) => {
            let snapshot = Snapshot::from_parts(
                payload.reservations,
                payload.conversations,
                payload.vacation_periods,
                message.timestamp.clone(),
            );
            tracing::info!(
                "Snapshot received: {} reservations, {} messages, {} vacation periods",
                snapshot.reservation_count(),
                snapshot.message_count(),
                snapshot.vacation_periods.len()
            );
            Transition::changed(snapshot, Notification::SnapshotReplaced)
        }
        Err(e) => {
            tracing::warn!("Discarding invalid snapshot: {}", e);
            Transition::unchanged(previous)
        }
    }
}

/// Created / updated / reinstated: replace by id, or append
fn upsert_reservation(
    previous: &Arc<Snapshot>,
    message: &InboundMessage,
    change: ReservationChange,
) -> Transition {
    let Some(id) = schema::payload_reservation_id(&message.data) else {
        tracing::warn!("Dropping {} without reservation id", message.kind.as_str());
        return Transition::unchanged(previous);
    };
    let Some(key) = schema::payload_customer_key(&message.data)
        .or_else(|| previous.locate_reservation(&id).map(|(key, _)| key.clone()))
    else {
        tracing::warn!(
            "Dropping {} for reservation '{}': no customer to file it under",
            message.kind.as_str(),
            id
        );
        return Transition::unchanged(previous);
    };
    let Some(mut reservation) = schema::accept_reservation(&message.data, Some(&key)) else {
        return Transition::unchanged(previous);
    };
    if change == ReservationChange::Reinstated {
        reservation.cancelled = false;
    }

    let mut list = previous.reservations_for(&key).to_vec();
    let prior = match list.iter().position(|r| r.id == reservation.id) {
        Some(idx) if list[idx] == reservation => {
            tracing::debug!("Reservation '{}' unchanged", reservation.id);
            return Transition::unchanged(previous);
        }
        Some(idx) => Some(std::mem::replace(&mut list[idx], reservation.clone())),
        None => {
            list.push(reservation.clone());
            None
        }
    };

    let snapshot = previous.with_reservations(key, list, message.timestamp.clone());
    Transition::changed(
        snapshot,
        Notification::ReservationChanged {
            change,
            reservation,
            previous: prior,
        },
    )
}

fn cancel_reservation(previous: &Arc<Snapshot>, message: &InboundMessage) -> Transition {
    let Some(id) = schema::payload_reservation_id(&message.data) else {
        tracing::warn!("Dropping reservation_cancelled without reservation id");
        return Transition::unchanged(previous);
    };

    // the cancel message may not carry the customer; fall back to a full scan
    let located: Option<(CustomerKey, usize)> = schema::payload_customer_key(&message.data)
        .and_then(|key| previous.position_in(&key, &id).map(|idx| (key, idx)))
        .or_else(|| {
            previous
                .locate_reservation(&id)
                .map(|(key, idx)| (key.clone(), idx))
        });
    let Some((key, idx)) = located else {
        tracing::debug!("No reservation '{}' to cancel", id);
        return Transition::unchanged(previous);
    };

    let current = &previous.reservations_for(&key)[idx];
    let cancelled = schema::merge_cancellation(current, &message.data);
    if &cancelled == current {
        return Transition::unchanged(previous);
    }

    let mut list = previous.reservations_for(&key).to_vec();
    let prior = std::mem::replace(&mut list[idx], cancelled.clone());
    let snapshot = previous.with_reservations(key, list, message.timestamp.clone());
    Transition::changed(
        snapshot,
        Notification::ReservationChanged {
            change: ReservationChange::Cancelled,
            reservation: cancelled,
            previous: Some(prior),
        },
    )
}

fn append_conversation_message(previous: &Arc<Snapshot>, message: &InboundMessage) -> Transition {
    let Some(key) = schema::payload_customer_key(&message.data) else {
        tracing::warn!("Dropping conversation message without customer");
        return Transition::unchanged(previous);
    };
    let entry = schema::accept_conversation_message(&message.data, &key);

    let mut thread = previous.conversation_for(&key).to_vec();
    thread.push(entry.clone());
    let snapshot = previous.with_conversation(key.clone(), thread, message.timestamp.clone());
    Transition::changed(
        snapshot,
        Notification::NewConversationMessage {
            customer_key: key,
            message: entry,
        },
    )
}

fn replace_vacation_periods(previous: &Arc<Snapshot>, message: &InboundMessage) -> Transition {
    match schema::validate_vacation_periods(&message.data) {
        Ok(periods) if periods == *previous.vacation_periods => Transition::unchanged(previous),
        Ok(periods) => {
            let snapshot = previous.with_vacation_periods(periods, message.timestamp.clone());
            let periods = Arc::clone(&snapshot.vacation_periods);
            Transition::changed(snapshot, Notification::VacationPeriodsChanged(periods))
        }
        Err(e) => {
            tracing::warn!("Ignoring invalid vacation periods: {}", e);
            Transition::unchanged(previous)
        }
    }
}
