//! Data Transfer Objects (DTOs) for the reservation client.
//!
//! - `websocket`: inbound and outbound WebSocket frames
//! - `schema`: payload validation into domain entities
//! - `conversion`: DTO → domain entity conversion

pub mod conversion;
pub mod schema;
pub mod websocket;
