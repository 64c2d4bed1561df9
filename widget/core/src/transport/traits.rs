//! Transport Traits
//!
//! A [`Connector`] opens one physical connection and hands back a [`Link`]:
//! a sender for outgoing text frames and a receiver of [`LinkEvent`]s.
//! Dropping the link's sender closes the connection.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Capacity of the inbound event channel of a link
pub const LINK_CHANNEL_CAPACITY: usize = 100;

/// Errors that can occur while establishing or using a connection
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection to the backend failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection attempt did not finish in time
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Connection was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send a frame
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Endpoint address is unusable
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Something that happened on an established connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text frame arrived
    Text(String),
    /// The connection failed; no further events follow
    Error(String),
    /// The peer closed the connection
    Closed,
}

/// One established connection
#[derive(Debug)]
pub struct Link {
    /// Outgoing text frames; drop to close the connection
    pub outbound: mpsc::UnboundedSender<String>,
    /// Incoming events; `None` from `recv` means the connection is gone
    pub inbound: mpsc::Receiver<LinkEvent>,
}

impl Link {
    /// Create both ends of a link
    ///
    /// Returns the link plus the transport-side halves: a receiver of
    /// outgoing frames and a sender for incoming events.
    #[must_use]
    pub fn channel() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::Sender<LinkEvent>,
    ) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::channel(LINK_CHANNEL_CAPACITY);
        (Self { outbound, inbound }, outbound_rx, inbound_tx)
    }
}

/// Opens connections to the chat backend
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new physical connection
    async fn connect(&self) -> Result<Link, TransportError>;

    /// Human-readable endpoint description for logs
    fn endpoint(&self) -> String;
}
