//! Reservation calendar client library.
//!
//! Keeps reservations, conversation threads and vacation periods in sync with
//! the server over a single WebSocket connection, and lays out reservations
//! that share a time slot so they never overlap on the calendar.

// layers
pub mod domain;
pub mod infrastructure;
pub mod usecase;

// connection lifecycle
pub mod client;

// shared within the crate
pub mod config;
pub mod error;
