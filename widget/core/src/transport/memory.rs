//! In-Memory Transport
//!
//! Channel-backed connector for tests and embedding without a network. The
//! [`MemoryServer`] half plays the backend: it accepts each connection the
//! widget opens, reads the frames the widget sends, and pushes frames back.
//!
//! # Usage
//!
//! ```ignore
//! let (connector, mut server) = memory_pair();
//!
//! // Give `connector` to the widget, then drive the backend side
//! let mut conn = server.accept().await.unwrap();
//! assert!(matches!(conn.recv_frame().await, Some(ClientFrame::Auth { .. })));
//! conn.send_frame(&ServerFrame::Response { answer: "hi".into() }).await;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::protocol::{ClientFrame, ServerFrame};

use super::traits::{Connector, Link, LinkEvent, TransportError};

/// Create a connected connector/server pair
#[must_use]
pub fn memory_pair() -> (MemoryConnector, MemoryServer) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let refusals = Arc::new(AtomicUsize::new(0));
    let attempts = Arc::new(AtomicUsize::new(0));

    let connector = MemoryConnector {
        accept_tx,
        refusals: Arc::clone(&refusals),
        attempts: Arc::clone(&attempts),
    };
    let server = MemoryServer {
        accept_rx,
        refusals,
        attempts,
    };
    (connector, server)
}

/// Client half of an in-memory transport
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<ServerConnection>,
    refusals: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Link, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::ConnectionFailed(
                "connection refused by memory server".to_string(),
            ));
        }

        let (link, received, events) = Link::channel();
        self.accept_tx
            .send(ServerConnection { received, events })
            .map_err(|_| TransportError::ConnectionFailed("memory server dropped".to_string()))?;
        Ok(link)
    }

    fn endpoint(&self) -> String {
        "memory://".to_string()
    }
}

/// Backend half of an in-memory transport
#[derive(Debug)]
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<ServerConnection>,
    refusals: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryServer {
    /// Wait for the next connection the widget opens
    pub async fn accept(&mut self) -> Option<ServerConnection> {
        self.accept_rx.recv().await
    }

    /// Take an already-opened connection, if any
    pub fn try_accept(&mut self) -> Option<ServerConnection> {
        self.accept_rx.try_recv().ok()
    }

    /// Fail the next `count` connection attempts
    pub fn refuse_next(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    /// Number of connection attempts so far, refused ones included
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// Backend view of one accepted connection
///
/// Dropping it closes the connection from the widget's point of view.
#[derive(Debug)]
pub struct ServerConnection {
    received: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<LinkEvent>,
}

impl ServerConnection {
    /// Next raw text frame sent by the widget
    ///
    /// Returns `None` once the widget has dropped the connection.
    pub async fn recv(&mut self) -> Option<String> {
        self.received.recv().await
    }

    /// Next frame sent by the widget, parsed
    ///
    /// Frames that fail to parse are skipped with a warning.
    pub async fn recv_frame(&mut self) -> Option<ClientFrame> {
        loop {
            let text = self.received.recv().await?;
            match serde_json::from_str(&text) {
                Ok(frame) => return Some(frame),
                Err(e) => tracing::warn!(error = %e, frame = %text, "Unparseable client frame"),
            }
        }
    }

    /// Raw frame already sent by the widget, if any
    pub fn try_recv(&mut self) -> Option<String> {
        self.received.try_recv().ok()
    }

    /// Push a raw text frame to the widget
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.events
            .send(LinkEvent::Text(text.into()))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Push a server frame to the widget
    pub async fn send_frame(&self, frame: &ServerFrame) -> Result<(), TransportError> {
        let text = frame
            .to_text()
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.send_text(text).await
    }

    /// Report a transport failure to the widget
    pub async fn fail(self, reason: impl Into<String>) {
        let _ = self.events.send(LinkEvent::Error(reason.into())).await;
    }

    /// Close the connection from the backend side
    pub async fn close(self) {
        let _ = self.events.send(LinkEvent::Closed).await;
    }
}
