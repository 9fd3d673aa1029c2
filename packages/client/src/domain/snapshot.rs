//! Client-side snapshot of the server state.
//!
//! Every container is behind an `Arc`. A transition rebuilds only the
//! containers it touches, so consumers can compare sub-trees with
//! `Arc::ptr_eq` to see whether anything relevant changed.

use std::{collections::HashMap, sync::Arc};

use super::reservation::{
    ConversationMessage, CustomerKey, Reservation, ReservationId, VacationPeriod,
};

pub type ReservationLists = HashMap<CustomerKey, Arc<Vec<Reservation>>>;
pub type ConversationThreads = HashMap<CustomerKey, Arc<Vec<ConversationMessage>>>;

/// Authoritative client-side state
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub reservations: Arc<ReservationLists>,
    pub conversations: Arc<ConversationThreads>,
    pub vacation_periods: Arc<Vec<VacationPeriod>>,
    pub last_update_timestamp: Option<String>,
}

impl Snapshot {
    /// Build a snapshot from plain collections
    pub fn from_parts(
        reservations: HashMap<CustomerKey, Vec<Reservation>>,
        conversations: HashMap<CustomerKey, Vec<ConversationMessage>>,
        vacation_periods: Vec<VacationPeriod>,
        last_update_timestamp: Option<String>,
    ) -> Self {
        Self {
            reservations: Arc::new(
                reservations
                    .into_iter()
                    .map(|(key, list)| (key, Arc::new(list)))
                    .collect(),
            ),
            conversations: Arc::new(
                conversations
                    .into_iter()
                    .map(|(key, list)| (key, Arc::new(list)))
                    .collect(),
            ),
            vacation_periods: Arc::new(vacation_periods),
            last_update_timestamp,
        }
    }

    /// Reservations of one customer (empty when the customer is unknown)
    pub fn reservations_for(&self, key: &CustomerKey) -> &[Reservation] {
        self.reservations
            .get(key)
            .map(|list| list.as_slice())
            .unwrap_or_default()
    }

    /// Conversation thread of one customer
    pub fn conversation_for(&self, key: &CustomerKey) -> &[ConversationMessage] {
        self.conversations
            .get(key)
            .map(|list| list.as_slice())
            .unwrap_or_default()
    }

    /// Position of a reservation inside a given customer's list
    pub fn position_in(&self, key: &CustomerKey, id: &ReservationId) -> Option<usize> {
        self.reservations_for(key).iter().position(|r| &r.id == id)
    }

    /// Find a reservation by id across every customer.
    ///
    /// Keys are visited in sorted order so the answer does not depend on hash
    /// iteration order when an id is present under several customers.
    pub fn locate_reservation(&self, id: &ReservationId) -> Option<(&CustomerKey, usize)> {
        let mut keys: Vec<&CustomerKey> = self.reservations.keys().collect();
        keys.sort();
        keys.into_iter()
            .find_map(|key| self.position_in(key, id).map(|idx| (key, idx)))
    }

    /// Iterate over every reservation of every customer
    pub fn all_reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.values().flat_map(|list| list.iter())
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.values().map(|list| list.len()).sum()
    }

    pub fn message_count(&self) -> usize {
        self.conversations.values().map(|list| list.len()).sum()
    }

    /// New snapshot with one customer's reservation list replaced.
    /// Every other list keeps its `Arc`.
    pub fn with_reservations(
        &self,
        key: CustomerKey,
        list: Vec<Reservation>,
        timestamp: Option<String>,
    ) -> Snapshot {
        let mut reservations = (*self.reservations).clone();
        reservations.insert(key, Arc::new(list));
        Snapshot {
            reservations: Arc::new(reservations),
            conversations: Arc::clone(&self.conversations),
            vacation_periods: Arc::clone(&self.vacation_periods),
            last_update_timestamp: timestamp.or_else(|| self.last_update_timestamp.clone()),
        }
    }

    /// New snapshot with one customer's thread replaced
    pub fn with_conversation(
        &self,
        key: CustomerKey,
        list: Vec<ConversationMessage>,
        timestamp: Option<String>,
    ) -> Snapshot {
        let mut conversations = (*self.conversations).clone();
        conversations.insert(key, Arc::new(list));
        Snapshot {
            reservations: Arc::clone(&self.reservations),
            conversations: Arc::new(conversations),
            vacation_periods: Arc::clone(&self.vacation_periods),
            last_update_timestamp: timestamp.or_else(|| self.last_update_timestamp.clone()),
        }
    }

    /// New snapshot with the vacation list replaced as a whole
    pub fn with_vacation_periods(
        &self,
        periods: Vec<VacationPeriod>,
        timestamp: Option<String>,
    ) -> Snapshot {
        Snapshot {
            reservations: Arc::clone(&self.reservations),
            conversations: Arc::clone(&self.conversations),
            vacation_periods: Arc::new(periods),
            last_update_timestamp: timestamp.or_else(|| self.last_update_timestamp.clone()),
        }
    }
}
