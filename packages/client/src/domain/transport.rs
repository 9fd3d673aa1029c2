//! Transport port used by the connection manager.
//!
//! A `Connector` opens a `Link`, which is split into a write half and a read
//! half like a WebSocket stream. The WebSocket implementation lives in
//! `infrastructure::transport`.

use async_trait::async_trait;

use crate::error::ClientError;

/// Close code for a deliberate, normal closure
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the stream ended without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Something read from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame
    Text(String),
    /// The stream closed; `None` when no close frame was received
    Closed(Option<u16>),
    /// The stream failed
    Failed(String),
}

/// Write half of a stream
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ClientError>;

    /// Send a close frame with the given code
    async fn close(&mut self, code: u16);
}

/// Read half of a stream
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame. Once `Closed` or `Failed` is returned the
    /// source is finished.
    async fn recv(&mut self) -> Inbound;
}

/// An open stream
pub struct Link {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Opens streams
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Link, ClientError>;
}
