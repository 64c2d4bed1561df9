//! Widget Session
//!
//! The session is split in two:
//!
//! - [`SessionController`]: a pure state machine. It takes one
//!   [`SessionEvent`] at a time, mutates the message log and flags, and
//!   returns the [`Effect`]s the outside world must carry out. It never
//!   touches a socket or a clock.
//! - [`SessionDriver`]: the tokio task that owns a controller, feeds it
//!   events from a single queue, and executes the effects it returns
//!   (connecting, sending frames, fetching history, arming timers, pushing
//!   [`ViewUpdate`]s to the presentation layer).
//!
//! # Event Flow
//!
//! ```text
//!  host intents ─┐
//!  link events ──┼──► queue ──► SessionController::handle ──► effects
//!  timers ───────┤                                              │
//!  history ──────┘◄───────────── SessionDriver ◄────────────────┘
//!                                     │
//!                                     └──► ViewUpdate ──► presentation
//! ```
//!
//! Every event is applied atomically before the next one is taken from the
//! queue. Connections and timers carry generation ids so events from a
//! connection or timer that has since been replaced are discarded.

mod controller;
mod driver;

pub use controller::SessionController;
pub use driver::{
    CommandSender, SessionCommand, SessionDriver, SessionError, DEFAULT_CONNECT_TIMEOUT,
};

use std::fmt;
use std::time::Duration;

use crate::history::{HistoryPage, PageRequest};
use crate::messages::{Message, Role};

/// Generation id of one physical connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Generation id of one armed timer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// What happened on a connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection is established
    Opened,
    /// A text frame arrived
    Frame {
        /// Raw frame text
        text: String,
    },
    /// Connecting failed, or the connection broke
    Error {
        /// Description for logs
        error: String,
    },
    /// The connection closed
    Closed,
}

/// Input to the session controller
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The widget was opened
    Open,
    /// The user submitted text
    Send(String),
    /// The user scrolled to the top of the message list
    ScrollToTop {
        /// Content height of the scroll container at that moment
        content_height: f64,
    },
    /// The host tears the widget down
    Close,
    /// Something happened on a connection
    Connection {
        /// Which connection
        connection: ConnectionId,
        /// What happened
        event: ConnectionEvent,
    },
    /// A history fetch completed
    HistoryLoaded {
        /// The request that was fetched
        request: PageRequest,
        /// What came back
        page: HistoryPage,
    },
    /// The processing watchdog fired
    WatchdogFired {
        /// Which arming fired
        timer: TimerId,
    },
    /// The stream ticker ticked
    StreamTick {
        /// Which ticker ticked
        timer: TimerId,
    },
}

/// How the presentation layer should move the scroll position
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScrollDirective {
    /// Leave it alone
    None,
    /// Scroll to the newest message
    Bottom,
    /// Content was prepended; shift by `new_height - previous_content_height`
    PreserveAnchor {
        /// Content height recorded before the fetch
        previous_content_height: f64,
    },
}

/// Work the controller asks the driver to carry out
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Open a new physical connection
    Connect {
        /// Id the connection will be known by
        connection: ConnectionId,
    },
    /// Send a text frame
    Transmit {
        /// Target connection
        connection: ConnectionId,
        /// Encoded frame
        frame: String,
    },
    /// Close and forget a connection
    Disconnect {
        /// Connection to drop
        connection: ConnectionId,
    },
    /// Fetch a history page
    FetchHistory(PageRequest),
    /// Arm the watchdog, replacing any armed one
    ArmWatchdog {
        /// Id reported back when it fires
        timer: TimerId,
        /// Delay before firing
        after: Duration,
    },
    /// Disarm the watchdog
    CancelWatchdog,
    /// Start the stream ticker, replacing any running one
    StartTicker {
        /// Id reported back on every tick
        timer: TimerId,
        /// Tick period
        period: Duration,
    },
    /// Stop the stream ticker
    StopTicker,
    /// Publish a fresh snapshot to the presentation layer
    Render {
        /// Scroll behavior for this render
        scroll: ScrollDirective,
    },
}

/// Read-only view of a session for rendering
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    /// The message log in display order
    pub messages: Vec<Message>,
    /// Partially revealed answer while streaming
    pub stream_buffer: Option<String>,
    /// A query is outstanding
    pub is_waiting_for_reply: bool,
    /// An answer is being revealed
    pub is_streaming: bool,
    /// A history page is being fetched
    pub is_loading_history: bool,
    /// Older history may exist
    pub has_more_history: bool,
    /// A connection is established and authenticated
    pub connected: bool,
}

impl SessionSnapshot {
    /// Whether the input box should accept text
    #[must_use]
    pub fn input_enabled(&self) -> bool {
        !self.is_waiting_for_reply && !self.is_streaming
    }

    /// Messages plus the in-flight stream row, as rendered
    #[must_use]
    pub fn rows(&self) -> Vec<Message> {
        let mut rows = self.messages.clone();
        if let Some(ref buffer) = self.stream_buffer {
            rows.push(Message::new(Role::BotStream, buffer.clone()));
        }
        rows
    }
}

/// One render request delivered to the presentation layer
#[derive(Clone, Debug, PartialEq)]
pub struct ViewUpdate {
    /// State to render
    pub snapshot: SessionSnapshot,
    /// Scroll behavior
    pub scroll: ScrollDirective,
}
