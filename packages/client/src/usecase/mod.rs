//! Use cases: pure state transitions and calendar layout.
//!
//! - `reducer`: inbound message → new snapshot + notifications
//! - `store`: current snapshot and notification fan-out
//! - `reflow`: non-overlapping layout of a slot
//! - `local_move`: echo suppression after a local drag
//! - `calendar_sync`: keeps a render surface in step with the snapshot

pub mod calendar_sync;
pub mod local_move;
pub mod reducer;
pub mod reflow;
pub mod store;

pub use calendar_sync::{CalendarSync, SyncOutcome};
pub use local_move::LocalMoveRegistry;
pub use reducer::{Transition, reduce};
pub use reflow::{ReflowEngine, ReflowOptions, ReflowReport};
pub use store::SnapshotStore;
