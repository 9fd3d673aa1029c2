//! Stream transports
//!
//! - `websocket`: tokio-tungstenite implementation of the `Connector` port

pub mod websocket;

#[cfg(test)]
pub(crate) mod fake;

pub use websocket::WebSocketConnector;
