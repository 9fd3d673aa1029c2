//! In-process transport for tests.
//!
//! Every successful `connect` hands the test a `FakeRemote`, which plays the
//! server side of that one link.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    domain::{Connector, FrameSink, FrameSource, Inbound, Link},
    error::ClientError,
};

pub(crate) struct FakeConnector {
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
    remotes: mpsc::UnboundedSender<FakeRemote>,
}

impl FakeConnector {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeRemote>) {
        let (remotes, remote_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            attempts: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            remotes,
        });
        (connector, remote_rx)
    }

    /// Number of times `connect` was called
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Refuse the next `count` connection attempts
    pub(crate) fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Link, ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ClientError::ConnectionError("connection refused".to_string()));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let _ = self.remotes.send(FakeRemote {
            inbound: inbound_tx.clone(),
            sent: sent_rx,
        });

        Ok(Link {
            sink: Box::new(FakeSink {
                sent: sent_tx,
                inbound: inbound_tx,
            }),
            source: Box::new(FakeSource { inbound: inbound_rx }),
        })
    }
}

/// Server side of one fake link
pub(crate) struct FakeRemote {
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: mpsc::UnboundedReceiver<String>,
}

impl FakeRemote {
    pub(crate) fn push(&self, text: impl Into<String>) {
        let _ = self.inbound.send(Inbound::Text(text.into()));
    }

    pub(crate) fn close(&self, code: Option<u16>) {
        let _ = self.inbound.send(Inbound::Closed(code));
    }

    pub(crate) fn fail(&self, reason: &str) {
        let _ = self.inbound.send(Inbound::Failed(reason.to_string()));
    }

    /// Next frame the client sent, skipping keep-alive pings.
    /// A close frame shows up as `{"close": code}`.
    pub(crate) async fn next_frame(&mut self) -> Option<Value> {
        loop {
            let text = self.sent.recv().await?;
            let value: Value = serde_json::from_str(&text).ok()?;
            if value["type"] != "ping" {
                return Some(value);
            }
        }
    }

    /// Next frame the client sent, pings included
    pub(crate) async fn next_raw_frame(&mut self) -> Option<Value> {
        let text = self.sent.recv().await?;
        serde_json::from_str(&text).ok()
    }
}

struct FakeSink {
    sent: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedSender<Inbound>,
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.sent
            .send(text)
            .map_err(|e| ClientError::SendError(e.to_string()))
    }

    async fn close(&mut self, code: u16) {
        let _ = self.sent.send(format!("{{\"close\":{}}}", code));
        // the remote echoes the close frame
        let _ = self.inbound.send(Inbound::Closed(Some(code)));
    }
}

struct FakeSource {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameSource for FakeSource {
    async fn recv(&mut self) -> Inbound {
        self.inbound.recv().await.unwrap_or(Inbound::Closed(None))
    }
}
