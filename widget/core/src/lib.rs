//! Widget Core - Headless Session Engine for the Embeddable Chat Widget
//!
//! This crate holds everything behind the chat widget except pixels: the
//! wire codec, the conversation log, history pagination, simulated
//! streaming of answers, and the session state machine that ties them to a
//! backend connection. A presentation layer (a terminal, a web view, a test)
//! sends intents in and renders the [`ViewUpdate`]s that come out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Presentation Layer                         │
//! │        open / send / scroll_to_top        ViewUpdate          │
//! └─────────────────────┬─────────────────────────▲──────────────┘
//!                       │ WidgetHandle             │
//! ┌─────────────────────▼─────────────────────────┴──────────────┐
//! │                      SessionDriver (task)                     │
//! │  ┌────────────────────────────────────────────────────────┐   │
//! │  │                 SessionController                       │   │
//! │  │  MessageLog · HistoryPaginator · StreamSimulator        │   │
//! │  └────────────────────────────────────────────────────────┘   │
//! │        │ Connector / Link             │ HistoryProvider       │
//! └────────┼──────────────────────────────┼───────────────────────┘
//!          ▼                              ▼
//!    WebSocket backend              HTTP history endpoint
//! ```
//!
//! # Module Overview
//!
//! - [`config`]: Boot configuration (TOML file, environment, validation)
//! - [`embed`]: `init` factory and the [`WidgetHandle`]
//! - [`history`]: History pages, pagination, and the HTTP provider
//! - [`messages`]: Roles, messages, and the ordered message log
//! - [`protocol`]: JSON frames exchanged with the backend
//! - [`session`]: Controller state machine and its event-loop driver
//! - [`streaming`]: Character-by-character reveal of answers
//! - [`transport`]: Connection abstraction (WebSocket, in-memory)

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod embed;
pub mod history;
pub mod messages;
pub mod protocol;
pub mod session;
pub mod streaming;
pub mod transport;

// Re-exports for convenience
pub use config::{
    load_config, load_config_from_path, ConfigError, ConfigOverrides, ReconnectPolicy,
    SessionSettings, WidgetConfig,
};
#[cfg(feature = "websocket")]
pub use embed::init;
pub use embed::{init_with, InitConfig, InitError, Theme, WidgetHandle};
pub use history::{HistoryPage, HistoryProvider, HistoryRecord, HttpHistoryProvider};
pub use messages::{Message, MessageLog, Role};
pub use protocol::{ClientFrame, DecodeError, EncodeError, ServerFrame};
pub use session::{
    ScrollDirective, SessionCommand, SessionController, SessionError, SessionEvent,
    SessionSnapshot, ViewUpdate,
};
pub use streaming::StreamSimulator;
pub use transport::{Connector, Link, LinkEvent, TransportError};
