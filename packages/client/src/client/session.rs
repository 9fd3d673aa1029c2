//! One connection from open to close.
//!
//! The read loop runs on the session task and applies every frame to the
//! store in arrival order. Writes go through a channel drained by a writer
//! task; the keep-alive ping feeds the same channel.

use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, time::Instant};

use crate::{
    domain::{
        FrameSink, FrameSource, Inbound, Link,
        transport::{ABNORMAL_CLOSURE, NORMAL_CLOSURE},
    },
    infrastructure::dto::websocket::{InboundMessage, OutboundMessage},
};

use super::manager::{Inner, Outgoing};

/// Run the connection of `generation` until it closes
pub(crate) async fn run(inner: Arc<Inner>, generation: u64) {
    let link = match inner.connector.connect(&inner.config.url).await {
        Ok(link) => link,
        Err(e) => {
            inner.on_error(generation, &e.to_string());
            inner.on_close(generation, Some(ABNORMAL_CLOSURE));
            return;
        }
    };
    let Link {
        mut sink,
        mut source,
    } = link;

    let Some((outgoing_tx, outgoing_rx)) = inner.on_open(generation) else {
        tracing::debug!("Connection {} no longer wanted, closing", generation);
        sink.close(NORMAL_CLOSURE).await;
        inner.on_close(generation, Some(NORMAL_CLOSURE));
        return;
    };

    let writer = tokio::spawn(write_loop(sink, outgoing_rx));
    let pinger = tokio::spawn(ping_loop(outgoing_tx, inner.config.ping_interval));

    let code = read_loop(&inner, generation, source.as_mut()).await;

    pinger.abort();
    inner.on_close(generation, code);
    // the writer ends once the manager drops its sender
    let _ = writer.await;
}

async fn read_loop(inner: &Inner, generation: u64, source: &mut dyn FrameSource) -> Option<u16> {
    loop {
        match source.recv().await {
            Inbound::Text(text) => match InboundMessage::parse(&text) {
                Ok(message) => {
                    inner.store.apply(&message);
                }
                Err(e) => tracing::warn!("Discarding unreadable frame: {}", e),
            },
            Inbound::Closed(code) => {
                tracing::debug!("Connection {} closed with code {:?}", generation, code);
                return code;
            }
            Inbound::Failed(reason) => {
                inner.on_error(generation, &reason);
                return Some(ABNORMAL_CLOSURE);
            }
        }
    }
}

async fn write_loop(mut sink: Box<dyn FrameSink>, mut rx: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(outgoing) = rx.recv().await {
        match outgoing {
            Outgoing::Frame(message) => {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("Failed to serialize '{}': {}", message.r#type, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send_text(text).await {
                    tracing::warn!("Failed to send '{}': {}", message.r#type, e);
                    break;
                }
                tracing::debug!("Sent '{}'", message.r#type);
            }
            Outgoing::Close(code) => {
                sink.close(code).await;
                break;
            }
        }
    }
}

async fn ping_loop(tx: mpsc::UnboundedSender<Outgoing>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        if tx.send(Outgoing::Frame(OutboundMessage::ping())).is_err() {
            break;
        }
    }
}
