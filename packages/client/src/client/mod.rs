//! Connection lifecycle: one shared stream, reconnection and fan-out.

pub mod domain;
pub mod manager;
mod session;
pub mod subscription;

pub use manager::{ActiveHandle, ConnectOutcome, ConnectionManager, Delivery, Phase};
pub use subscription::Subscription;
