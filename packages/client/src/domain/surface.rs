//! Render surface port.
//!
//! The calendar widget owns the visible events; the client only reads them
//! and applies placements through this trait. The in-memory implementation
//! lives in the infrastructure layer.

use std::fmt;

use chrono::NaiveDateTime;

use super::{reservation::ReservationId, slot::SlotKey};
use crate::error::PlacementError;

/// Identifier of an event on the surface
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(String);

impl EventId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&ReservationId> for EventId {
    fn from(id: &ReservationId) -> Self {
        Self(id.as_str().to_string())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Reservation,
    /// Background marker such as a vacation period; never laid out
    VacationMarker,
}

/// An event as shown on the surface
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceEvent {
    pub id: EventId,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub kind: EventKind,
    /// Numeric appointment type, lower sorts first
    pub appointment_type: u8,
    pub cancelled: bool,
    /// Slot this event was last laid out in
    pub slot_tag: Option<SlotKey>,
}

impl SurfaceEvent {
    pub fn is_schedulable(&self) -> bool {
        self.kind == EventKind::Reservation && !self.cancelled
    }
}

/// Calendar rendering surface
#[cfg_attr(test, mockall::automock)]
pub trait RenderSurface {
    /// All events currently on the surface
    fn events(&self) -> Vec<SurfaceEvent>;

    fn event_by_id(&self, id: &EventId) -> Option<SurfaceEvent>;

    fn add_event(&mut self, event: SurfaceEvent);

    /// Move an event
    fn set_dates(
        &mut self,
        id: &EventId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<(), PlacementError>;

    /// Record which slot an event belongs to
    fn set_slot_tag(&mut self, id: &EventId, tag: Option<SlotKey>) -> Result<(), PlacementError>;

    fn remove_event(&mut self, id: &EventId) -> Option<SurfaceEvent>;
}
