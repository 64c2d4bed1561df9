//! Transport Layer for the Chat Connection
//!
//! Provides abstraction over how the widget reaches its backend:
//! - `WebSocket`: the live duplex connection (feature `websocket`)
//! - `Memory`: channel-backed fake for tests and offline embedding
//!
//! The session driver only sees [`Connector`] and [`Link`]; it never knows
//! which mechanism is behind them. Connection timeouts are applied by the
//! driver, not by individual connectors.

pub mod memory;
pub mod traits;
#[cfg(feature = "websocket")]
pub mod websocket;

// Re-exports for convenience
pub use memory::{memory_pair, MemoryConnector, MemoryServer, ServerConnection};
pub use traits::{Connector, Link, LinkEvent, TransportError, LINK_CHANNEL_CAPACITY};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;
