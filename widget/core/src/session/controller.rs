//! Session Controller
//!
//! The widget's state machine. Owns the message log, the connection
//! lifecycle flags, the history paginator and the active stream, and turns
//! each [`SessionEvent`] into a list of [`Effect`]s.
//!
//! # Rules
//!
//! - One auth frame per physical connection, sent as soon as it opens
//! - At most one processing entry; a new status replaces the old one
//! - Every terminal frame (`response` or `error`) cancels the watchdog
//! - A closed connection folds any running stream into the log, so no
//!   answer text is lost
//! - After [`SessionEvent::Close`] every event is ignored

use std::collections::VecDeque;

use crate::config::{ReconnectPolicy, SessionSettings};
use crate::history::{HistoryPage, HistoryPaginator, LoadKind, PageRequest};
use crate::messages::{
    Message, MessageLog, CONNECTION_ERROR_TEXT, INVALID_RESPONSE_TEXT, RESEND_REQUIRED_TEXT,
    STILL_WORKING_TEXT,
};
use crate::protocol::{decode, encode_auth, encode_query, ServerFrame};
use crate::streaming::{StreamSimulator, StreamStep};

use super::{
    ConnectionEvent, ConnectionId, Effect, ScrollDirective, SessionEvent, SessionSnapshot,
    TimerId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkState {
    Idle,
    Connecting(ConnectionId),
    Open(ConnectionId),
}

impl LinkState {
    fn id(self) -> Option<ConnectionId> {
        match self {
            Self::Idle => None,
            Self::Connecting(id) | Self::Open(id) => Some(id),
        }
    }
}

#[derive(Debug)]
struct ActiveStream {
    simulator: StreamSimulator,
    timer: TimerId,
}

/// State machine behind one widget instance
#[derive(Debug)]
pub struct SessionController {
    token: String,
    settings: SessionSettings,
    history_enabled: bool,

    log: MessageLog,
    link: LinkState,
    auth_sent: bool,
    waiting_for_reply: bool,
    stream: Option<ActiveStream>,
    watchdog: Option<TimerId>,
    paginator: HistoryPaginator,
    pending_queries: VecDeque<String>,
    closed: bool,

    next_connection: u64,
    next_timer: u64,
}

impl SessionController {
    /// Create a controller
    ///
    /// The log starts with `settings.welcome_message`. With
    /// `history_enabled` false, no history is ever requested.
    pub fn new(token: impl Into<String>, settings: SessionSettings, history_enabled: bool) -> Self {
        let log = MessageLog::with_welcome(settings.welcome_message.clone());
        let paginator = HistoryPaginator::new(settings.history_page_size);
        Self {
            token: token.into(),
            settings,
            history_enabled,
            log,
            link: LinkState::Idle,
            auth_sent: false,
            waiting_for_reply: false,
            stream: None,
            watchdog: None,
            paginator,
            pending_queries: VecDeque::new(),
            closed: false,
            next_connection: 0,
            next_timer: 0,
        }
    }

    /// Apply one event, returning the effects to carry out in order
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.closed {
            tracing::trace!("Session closed, ignoring event");
            return effects;
        }

        match event {
            SessionEvent::Open => self.on_open(&mut effects),
            SessionEvent::Send(text) => self.on_send(&text, &mut effects),
            SessionEvent::ScrollToTop { content_height } => {
                self.on_scroll_to_top(content_height, &mut effects);
            }
            SessionEvent::Close => self.on_close(&mut effects),
            SessionEvent::Connection { connection, event } => {
                self.on_connection(connection, event, &mut effects);
            }
            SessionEvent::HistoryLoaded { request, page } => {
                self.on_history_loaded(request, page, &mut effects);
            }
            SessionEvent::WatchdogFired { timer } => self.on_watchdog(timer, &mut effects),
            SessionEvent::StreamTick { timer } => self.on_stream_tick(timer, &mut effects),
        }

        effects
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Current state for rendering
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            messages: self.log.as_slice().to_vec(),
            stream_buffer: self
                .stream
                .as_ref()
                .map(|active| active.simulator.buffer().to_string()),
            is_waiting_for_reply: self.waiting_for_reply,
            is_streaming: self.stream.is_some(),
            is_loading_history: self.paginator.is_loading(),
            has_more_history: self.history_enabled && self.paginator.has_more(),
            connected: self.is_connected(),
        }
    }

    /// The message log
    #[must_use]
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// The history paginator
    #[must_use]
    pub fn paginator(&self) -> &HistoryPaginator {
        &self.paginator
    }

    /// Whether the current connection is open and authenticated
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.link, LinkState::Open(_)) && self.auth_sent
    }

    /// Id of the current connection, if one is open or being opened
    #[must_use]
    pub fn connection(&self) -> Option<ConnectionId> {
        self.link.id()
    }

    /// Whether the auth frame went out on the current connection
    #[must_use]
    pub fn auth_sent(&self) -> bool {
        self.auth_sent
    }

    /// Whether a query is outstanding
    #[must_use]
    pub fn is_waiting_for_reply(&self) -> bool {
        self.waiting_for_reply
    }

    /// Texts held until the next connection opens
    #[must_use]
    pub fn pending_queries(&self) -> usize {
        self.pending_queries.len()
    }

    /// Whether the session was torn down
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ========================================================================
    // Host Intents
    // ========================================================================

    fn on_open(&mut self, effects: &mut Vec<Effect>) {
        let mut changed = false;

        if self.history_enabled {
            if let Some(request) = self.paginator.begin_initial() {
                tracing::debug!(
                    offset = request.offset,
                    limit = request.limit,
                    "Loading initial history"
                );
                effects.push(Effect::FetchHistory(request));
                changed = true;
            }
        }

        if self.link == LinkState::Idle {
            self.connect(effects);
            changed = true;
        }

        if changed {
            effects.push(Effect::Render {
                scroll: ScrollDirective::Bottom,
            });
        }
    }

    fn on_send(&mut self, text: &str, effects: &mut Vec<Effect>) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        self.log.push(Message::user(text));
        self.waiting_for_reply = true;

        match self.link {
            LinkState::Open(connection) if self.auth_sent => match encode_query(text) {
                Ok(frame) => effects.push(Effect::Transmit { connection, frame }),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode query");
                    self.waiting_for_reply = false;
                }
            },
            _ => {
                // No live connection: the send fails and a connection is opened
                self.waiting_for_reply = false;
                match self.settings.reconnect {
                    ReconnectPolicy::Queue => {
                        self.pending_queries.push_back(text.to_string());
                        tracing::debug!(
                            pending = self.pending_queries.len(),
                            "Query held until the connection opens"
                        );
                    }
                    ReconnectPolicy::Resend => {
                        self.log.push(Message::error(RESEND_REQUIRED_TEXT));
                    }
                }
                if self.link == LinkState::Idle {
                    self.connect(effects);
                }
            }
        }

        effects.push(Effect::Render {
            scroll: ScrollDirective::Bottom,
        });
    }

    fn on_scroll_to_top(&mut self, content_height: f64, effects: &mut Vec<Effect>) {
        if !self.history_enabled {
            return;
        }

        match self.paginator.begin_older(content_height) {
            Some(request) => {
                tracing::debug!(
                    offset = request.offset,
                    limit = request.limit,
                    "Loading older history"
                );
                effects.push(Effect::FetchHistory(request));
                effects.push(Effect::Render {
                    scroll: ScrollDirective::None,
                });
            }
            None => {
                tracing::trace!(
                    loading = self.paginator.is_loading(),
                    has_more = self.paginator.has_more(),
                    "Older history not requested"
                );
            }
        }
    }

    fn on_history_loaded(
        &mut self,
        request: PageRequest,
        page: HistoryPage,
        effects: &mut Vec<Effect>,
    ) {
        let Some(outcome) = self.paginator.complete(request, page) else {
            tracing::trace!(offset = request.offset, "History page for a stale request ignored");
            return;
        };

        let scroll = match outcome.kind {
            LoadKind::Initial => ScrollDirective::Bottom,
            LoadKind::Older { anchor_height } if !outcome.messages.is_empty() => {
                ScrollDirective::PreserveAnchor {
                    previous_content_height: anchor_height,
                }
            }
            LoadKind::Older { .. } => ScrollDirective::None,
        };

        tracing::debug!(
            received = outcome.messages.len() / 2,
            offset = self.paginator.offset(),
            has_more = self.paginator.has_more(),
            "History page merged"
        );
        self.log.prepend(outcome.messages);
        effects.push(Effect::Render { scroll });
    }

    fn on_close(&mut self, effects: &mut Vec<Effect>) {
        self.fold_stream(effects);
        self.cancel_watchdog(effects);
        self.log.clear_processing();
        self.waiting_for_reply = false;
        self.paginator.abandon();
        self.pending_queries.clear();

        if let Some(connection) = self.link.id() {
            effects.push(Effect::Disconnect { connection });
        }
        self.link = LinkState::Idle;
        self.auth_sent = false;
        self.closed = true;

        tracing::info!(messages = self.log.len(), "Session closed");
    }

    // ========================================================================
    // Connection Events
    // ========================================================================

    fn on_connection(
        &mut self,
        connection: ConnectionId,
        event: ConnectionEvent,
        effects: &mut Vec<Effect>,
    ) {
        match event {
            ConnectionEvent::Opened => {
                if self.link != LinkState::Connecting(connection) {
                    tracing::trace!(
                        connection = %connection,
                        "Stale connection opened, dropping it"
                    );
                    effects.push(Effect::Disconnect { connection });
                    return;
                }
                self.link = LinkState::Open(connection);

                match encode_auth(&self.token) {
                    Ok(frame) => {
                        effects.push(Effect::Transmit { connection, frame });
                        self.auth_sent = true;
                    }
                    Err(e) => {
                        tracing::warn!(
                            connection = %connection,
                            error = %e,
                            "Failed to encode auth"
                        );
                        self.log.push(Message::error(CONNECTION_ERROR_TEXT));
                        self.drop_connection(connection, effects);
                        effects.push(Effect::Render {
                            scroll: ScrollDirective::Bottom,
                        });
                        return;
                    }
                }
                tracing::info!(connection = %connection, "Connection established");

                let scroll = if self.flush_pending(connection, effects) {
                    ScrollDirective::Bottom
                } else {
                    ScrollDirective::None
                };
                effects.push(Effect::Render { scroll });
            }

            ConnectionEvent::Frame { text } => {
                if self.link != LinkState::Open(connection) {
                    tracing::trace!(
                        connection = %connection,
                        "Frame from stale connection ignored"
                    );
                    return;
                }
                self.on_frame(&text, effects);
            }

            ConnectionEvent::Error { error } => {
                if self.link.id() != Some(connection) {
                    tracing::trace!(
                        connection = %connection,
                        "Error from stale connection ignored"
                    );
                    return;
                }
                tracing::warn!(connection = %connection, error = %error, "Connection error");
                self.log.push(Message::error(CONNECTION_ERROR_TEXT));
                self.drop_connection(connection, effects);
                effects.push(Effect::Render {
                    scroll: ScrollDirective::Bottom,
                });
            }

            ConnectionEvent::Closed => {
                if self.link.id() != Some(connection) {
                    tracing::trace!(connection = %connection, "Close of stale connection ignored");
                    return;
                }
                tracing::info!(connection = %connection, "Connection closed");
                self.drop_connection(connection, effects);
                effects.push(Effect::Render {
                    scroll: ScrollDirective::Bottom,
                });
            }
        }
    }

    fn on_frame(&mut self, text: &str, effects: &mut Vec<Effect>) {
        match decode(text) {
            Ok(Some(ServerFrame::Processing { message })) => {
                self.cancel_watchdog(effects);
                self.log.replace_processing(message);
                let timer = self.next_timer_id();
                self.watchdog = Some(timer);
                effects.push(Effect::ArmWatchdog {
                    timer,
                    after: self.settings.watchdog,
                });
            }
            Ok(Some(ServerFrame::Response { answer })) => {
                self.cancel_watchdog(effects);
                self.log.clear_processing();
                self.waiting_for_reply = false;
                self.start_stream(answer, effects);
            }
            Ok(Some(ServerFrame::Error { message })) => {
                self.cancel_watchdog(effects);
                self.log.clear_processing();
                self.log.push(Message::error(message));
                self.waiting_for_reply = false;
            }
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid server frame");
                self.log.push(Message::error(INVALID_RESPONSE_TEXT));
                self.waiting_for_reply = false;
            }
        }

        effects.push(Effect::Render {
            scroll: ScrollDirective::Bottom,
        });
    }

    fn connect(&mut self, effects: &mut Vec<Effect>) {
        self.next_connection += 1;
        let connection = ConnectionId(self.next_connection);
        self.link = LinkState::Connecting(connection);
        self.auth_sent = false;
        tracing::debug!(connection = %connection, "Opening connection");
        effects.push(Effect::Connect { connection });
    }

    /// Forget `connection` and reset everything tied to it
    fn drop_connection(&mut self, connection: ConnectionId, effects: &mut Vec<Effect>) {
        self.fold_stream(effects);
        self.cancel_watchdog(effects);
        self.log.clear_processing();
        self.waiting_for_reply = false;
        self.auth_sent = false;
        self.link = LinkState::Idle;
        effects.push(Effect::Disconnect { connection });
    }

    /// Send held queries on a freshly authenticated connection
    fn flush_pending(&mut self, connection: ConnectionId, effects: &mut Vec<Effect>) -> bool {
        if self.pending_queries.is_empty() {
            return false;
        }

        let mut flushed = 0;
        for text in self.pending_queries.drain(..) {
            match encode_query(&text) {
                Ok(frame) => {
                    effects.push(Effect::Transmit { connection, frame });
                    flushed += 1;
                }
                Err(e) => tracing::warn!(error = %e, "Failed to encode held query"),
            }
        }
        if flushed > 0 {
            self.waiting_for_reply = true;
            tracing::debug!(connection = %connection, flushed, "Held queries sent");
        }
        flushed > 0
    }

    // ========================================================================
    // Timers and Streaming
    // ========================================================================

    fn on_watchdog(&mut self, timer: TimerId, effects: &mut Vec<Effect>) {
        if self.watchdog != Some(timer) {
            tracing::trace!(timer = %timer, "Stale watchdog ignored");
            return;
        }
        self.watchdog = None;

        if self.log.processing().is_none() {
            return;
        }
        tracing::debug!(timer = %timer, "Processing is taking long, escalating status");
        self.log.replace_processing(STILL_WORKING_TEXT);
        effects.push(Effect::Render {
            scroll: ScrollDirective::Bottom,
        });
    }

    fn on_stream_tick(&mut self, timer: TimerId, effects: &mut Vec<Effect>) {
        let Some(active) = self.stream.as_mut() else {
            tracing::trace!(timer = %timer, "Tick without active stream ignored");
            return;
        };
        if active.timer != timer {
            tracing::trace!(timer = %timer, "Stale stream tick ignored");
            return;
        }

        // The tick that reveals the last character also folds the answer
        let revealed = matches!(active.simulator.advance(), StreamStep::Revealed(_));
        if !revealed || active.simulator.is_complete() {
            self.fold_stream(effects);
        }
        effects.push(Effect::Render {
            scroll: ScrollDirective::Bottom,
        });
    }

    fn start_stream(&mut self, answer: String, effects: &mut Vec<Effect>) {
        self.fold_stream(effects);

        let timer = self.next_timer_id();
        self.stream = Some(ActiveStream {
            simulator: StreamSimulator::start(answer),
            timer,
        });
        effects.push(Effect::StartTicker {
            timer,
            period: self.settings.stream_tick,
        });
    }

    /// Move the active stream's full text into the log
    fn fold_stream(&mut self, effects: &mut Vec<Effect>) {
        if let Some(active) = self.stream.take() {
            self.log.push(Message::bot(active.simulator.into_text()));
            effects.push(Effect::StopTicker);
        }
    }

    fn cancel_watchdog(&mut self, effects: &mut Vec<Effect>) {
        if self.watchdog.take().is_some() {
            effects.push(Effect::CancelWatchdog);
        }
    }

    fn next_timer_id(&mut self) -> TimerId {
        self.next_timer += 1;
        TimerId(self.next_timer)
    }
}
