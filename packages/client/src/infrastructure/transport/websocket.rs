//! WebSocket transport built on tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::protocol::{CloseFrame, Message, frame::coding::CloseCode},
};

use crate::{
    domain::{Connector, FrameSink, FrameSource, Inbound, Link},
    error::ClientError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Link, ClientError> {
        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;
        tracing::debug!(
            "WebSocket handshake with {} completed ({})",
            url,
            response.status()
        );

        let (write, read) = ws_stream.split();
        Ok(Link {
            sink: Box::new(WebSocketSink { write }),
            source: Box::new(WebSocketSource { read }),
        })
    }
}

struct WebSocketSink {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.write
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientError::SendError(e.to_string()))
    }

    async fn close(&mut self, code: u16) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: String::from("client closing").into(),
        };
        if let Err(e) = self.write.send(Message::Close(Some(frame))).await {
            tracing::debug!("Failed to send close frame: {}", e);
        }
    }
}

struct WebSocketSource {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn recv(&mut self) -> Inbound {
        while let Some(message) = self.read.next().await {
            match message {
                Ok(Message::Text(text)) => return Inbound::Text(text.as_str().to_owned()),
                Ok(Message::Close(frame)) => {
                    return Inbound::Closed(frame.map(|frame| u16::from(frame.code)));
                }
                Ok(Message::Binary(data)) => {
                    tracing::debug!("Ignoring {} bytes of binary data", data.len());
                }
                // ping/pong are answered by tungstenite itself
                Ok(_) => {}
                Err(e) => return Inbound::Failed(e.to_string()),
            }
        }
        Inbound::Closed(None)
    }
}
