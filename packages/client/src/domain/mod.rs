//! Domain layer: entities, value objects and the ports the use cases depend on.

pub mod notification;
pub mod reservation;
pub mod slot;
pub mod snapshot;
pub mod surface;
pub mod transport;

pub use notification::{Notification, ReservationChange};
pub use reservation::{
    ConversationMessage, CustomerKey, Reservation, ReservationId, ReservationType, VacationPeriod,
};
pub use slot::{BusinessHours, SlotConfig, SlotKey};
pub use snapshot::Snapshot;
pub use surface::{EventId, EventKind, RenderSurface, SurfaceEvent};
pub use transport::{Connector, FrameSink, FrameSource, Inbound, Link};
