//! WebSocket Connector
//!
//! Live transport for the chat backend. Each call to
//! [`Connector::connect`] opens a fresh socket and splits it into a read
//! task and a write task bridged to the returned [`Link`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::Instrument;

use super::traits::{Connector, Link, LinkEvent, TransportError};

/// Connector for `ws://` and `wss://` endpoints
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Create a connector for the given socket URL
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Socket URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Link, TransportError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(TransportError::InvalidEndpoint(self.url.clone()));
        }

        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {e}", self.url)))?;

        let (mut write, mut read) = stream.split();
        let (link, mut outgoing, events) = Link::channel();

        // Write task: link.outbound -> socket
        let writer = async move {
            while let Some(text) = outgoing.recv().await {
                if let Err(e) = write.send(WsMessage::Text(text)).await {
                    tracing::warn!(error = %e, "WebSocket write error");
                    break;
                }
            }
            // Sender dropped: close the socket politely
            if let Err(e) = write.close().await {
                tracing::debug!(error = %e, "WebSocket close error");
            }
        };
        tokio::spawn(writer.in_current_span());

        // Read task: socket -> link.inbound
        let reader = async move {
            let last = loop {
                match read.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        if events.send(LinkEvent::Text(text)).await.is_err() {
                            tracing::debug!("Link receiver dropped");
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        tracing::debug!(?frame, "WebSocket closed by server");
                        break LinkEvent::Closed;
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        tracing::debug!(len = data.len(), "Ignoring binary frame");
                    }
                    // Ping/pong are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket read error");
                        break LinkEvent::Error(e.to_string());
                    }
                    None => break LinkEvent::Closed,
                }
            };
            let _ = events.send(last).await;
        };
        tokio::spawn(reader.in_current_span());

        tracing::info!(url = %self.url, "Connected to chat backend");
        Ok(link)
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}
