//! Session Driver
//!
//! Runs one [`SessionController`] on a tokio task. Host commands, link
//! events, timer firings and history results all arrive on a single queue
//! and are applied one at a time; the effects returned by the controller
//! are carried out before the next item is taken.
//!
//! Background work (connecting, reading a link, fetching history, timers)
//! runs in spawned tasks that only ever post back into the queue. Each task
//! is aborted when the thing it serves is replaced or the driver stops.
//!
//! Publishing a view update waits for room in the bounded view channel. A
//! close request also raises a signal outside the queue so a host that has
//! stopped reading can still tear the session down; once raised, further
//! renders are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use crate::history::{HistoryPage, HistoryProvider, PageRequest};
use crate::transport::{Connector, Link, LinkEvent, TransportError};

use super::{
    ConnectionEvent, ConnectionId, Effect, ScrollDirective, SessionController, SessionEvent,
    TimerId, ViewUpdate,
};

/// Default upper bound on establishing a connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The session is no longer running
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The widget was destroyed
    #[error("widget session has been destroyed")]
    Closed,
}

/// Intents the embedding host can send to a running session
#[derive(Clone, Debug, PartialEq)]
pub enum SessionCommand {
    /// The widget was opened
    Open,
    /// The user submitted text
    Send(String),
    /// The user scrolled to the top; carries the current content height
    ScrollToTop {
        /// Content height of the scroll container
        content_height: f64,
    },
    /// Tear the session down
    Close,
}

impl From<SessionCommand> for SessionEvent {
    fn from(command: SessionCommand) -> Self {
        match command {
            SessionCommand::Open => Self::Open,
            SessionCommand::Send(text) => Self::Send(text),
            SessionCommand::ScrollToTop { content_height } => Self::ScrollToTop { content_height },
            SessionCommand::Close => Self::Close,
        }
    }
}

#[derive(Debug)]
enum Inbound {
    Command(SessionCommand),
    Event(SessionEvent),
    LinkReady {
        connection: ConnectionId,
        link: Link,
    },
}

/// Cloneable sender of host commands into a running driver
#[derive(Clone, Debug)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Inbound>,
    close_signal: Arc<Notify>,
}

impl CommandSender {
    /// Queue a command
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] once the driver has stopped.
    pub fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        let closing = matches!(command, SessionCommand::Close);
        self.tx
            .send(Inbound::Command(command))
            .map_err(|_| SessionError::Closed)?;
        if closing {
            self.close_signal.notify_one();
        }
        Ok(())
    }

    /// Whether the driver has stopped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Aborts the wrapped task when dropped
#[derive(Debug)]
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A single replaceable timer
#[derive(Debug, Default)]
struct TimerSlot {
    task: Option<AbortOnDrop>,
}

impl TimerSlot {
    fn arm(&mut self, task: JoinHandle<()>) {
        // Replacing drops (and aborts) the previous task
        self.task = Some(AbortOnDrop(task));
    }

    fn cancel(&mut self) {
        self.task = None;
    }
}

#[derive(Debug)]
struct ActiveLink {
    outbound: mpsc::UnboundedSender<String>,
    _pump: AbortOnDrop,
}

/// Event loop owning one session controller
pub struct SessionDriver {
    session_id: Uuid,
    controller: SessionController,
    connector: Arc<dyn Connector>,
    history: Option<Arc<dyn HistoryProvider>>,
    user_id: String,
    connect_timeout: Duration,

    inbox: mpsc::UnboundedReceiver<Inbound>,
    loopback: mpsc::UnboundedSender<Inbound>,
    views: mpsc::Sender<ViewUpdate>,
    close_signal: Arc<Notify>,
    closing: bool,

    links: HashMap<ConnectionId, ActiveLink>,
    connecting: HashMap<ConnectionId, AbortOnDrop>,
    fetch: Option<AbortOnDrop>,
    watchdog: TimerSlot,
    ticker: TimerSlot,
}

impl SessionDriver {
    /// Create a driver; nothing runs until [`SessionDriver::run`]
    pub fn new(
        controller: SessionController,
        connector: Arc<dyn Connector>,
        views: mpsc::Sender<ViewUpdate>,
    ) -> Self {
        let (loopback, inbox) = mpsc::unbounded_channel();
        Self {
            session_id: Uuid::new_v4(),
            controller,
            connector,
            history: None,
            user_id: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            inbox,
            loopback,
            views,
            close_signal: Arc::new(Notify::new()),
            closing: false,
            links: HashMap::new(),
            connecting: HashMap::new(),
            fetch: None,
            watchdog: TimerSlot::default(),
            ticker: TimerSlot::default(),
        }
    }

    /// Fetch history for `user_id` from `provider`
    #[must_use]
    pub fn with_history(
        mut self,
        provider: Arc<dyn HistoryProvider>,
        user_id: impl Into<String>,
    ) -> Self {
        self.history = Some(provider);
        self.user_id = user_id.into();
        self
    }

    /// Override the connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the id used in log spans
    #[must_use]
    pub fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = session_id;
        self
    }

    /// Id used in log spans
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Sender for host commands
    #[must_use]
    pub fn commands(&self) -> CommandSender {
        CommandSender {
            tx: self.loopback.clone(),
            close_signal: Arc::clone(&self.close_signal),
        }
    }

    /// Process events until the session is closed
    pub async fn run(mut self) {
        let span = tracing::info_span!("widget_session", session_id = %self.session_id);
        async move {
            tracing::debug!(endpoint = %self.connector.endpoint(), "Session started");
            self.run_loop().await;
            self.shutdown();
            tracing::debug!("Session stopped");
        }
        .instrument(span)
        .await;
    }

    async fn run_loop(&mut self) {
        while let Some(inbound) = self.inbox.recv().await {
            let event = match inbound {
                Inbound::Command(command) => SessionEvent::from(command),
                Inbound::Event(event) => event,
                Inbound::LinkReady { connection, link } => {
                    self.attach_link(connection, link);
                    SessionEvent::Connection {
                        connection,
                        event: ConnectionEvent::Opened,
                    }
                }
            };

            let closing = matches!(event, SessionEvent::Close);
            let effects = self.controller.handle(event);
            self.execute(effects).await;

            if closing {
                break;
            }
        }
    }

    fn shutdown(&mut self) {
        self.inbox.close();
        self.links.clear();
        self.connecting.clear();
        self.fetch = None;
        self.watchdog.cancel();
        self.ticker.cancel();
    }

    async fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Connect { connection } => self.spawn_connect(connection),
                Effect::Transmit { connection, frame } => self.transmit(connection, frame),
                Effect::Disconnect { connection } => {
                    if self.links.remove(&connection).is_some() {
                        tracing::debug!(connection = %connection, "Link dropped");
                    }
                    self.connecting.remove(&connection);
                }
                Effect::FetchHistory(request) => self.spawn_fetch(request),
                Effect::ArmWatchdog { timer, after } => self.arm_watchdog(timer, after),
                Effect::CancelWatchdog => self.watchdog.cancel(),
                Effect::StartTicker { timer, period } => self.start_ticker(timer, period),
                Effect::StopTicker => self.ticker.cancel(),
                Effect::Render { scroll } => self.publish(scroll).await,
            }
        }
    }

    fn post(&self, event: SessionEvent) {
        // Only fails once the driver itself is gone
        let _ = self.loopback.send(Inbound::Event(event));
    }

    fn spawn_connect(&mut self, connection: ConnectionId) {
        let connector = Arc::clone(&self.connector);
        let loopback = self.loopback.clone();
        let timeout = self.connect_timeout;

        let task = tokio::spawn(
            async move {
                let outcome = match tokio::time::timeout(timeout, connector.connect()).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(timeout)),
                };
                let inbound = match outcome {
                    Ok(link) => Inbound::LinkReady { connection, link },
                    Err(e) => {
                        tracing::warn!(
                            connection = %connection,
                            endpoint = %connector.endpoint(),
                            error = %e,
                            "Failed to connect"
                        );
                        Inbound::Event(SessionEvent::Connection {
                            connection,
                            event: ConnectionEvent::Error {
                                error: e.to_string(),
                            },
                        })
                    }
                };
                let _ = loopback.send(inbound);
            }
            .in_current_span(),
        );
        self.connecting.insert(connection, AbortOnDrop(task));
    }

    fn attach_link(&mut self, connection: ConnectionId, link: Link) {
        self.connecting.remove(&connection);

        let Link {
            outbound,
            mut inbound,
        } = link;
        let loopback = self.loopback.clone();

        // Pump: link events -> queue, ending after the first terminal event
        let pump = tokio::spawn(
            async move {
                while let Some(event) = inbound.recv().await {
                    let (event, terminal) = match event {
                        LinkEvent::Text(text) => (ConnectionEvent::Frame { text }, false),
                        LinkEvent::Error(error) => (ConnectionEvent::Error { error }, true),
                        LinkEvent::Closed => (ConnectionEvent::Closed, true),
                    };
                    let sent = loopback.send(Inbound::Event(SessionEvent::Connection {
                        connection,
                        event,
                    }));
                    if sent.is_err() || terminal {
                        return;
                    }
                }
                let _ = loopback.send(Inbound::Event(SessionEvent::Connection {
                    connection,
                    event: ConnectionEvent::Closed,
                }));
            }
            .in_current_span(),
        );

        self.links.insert(
            connection,
            ActiveLink {
                outbound,
                _pump: AbortOnDrop(pump),
            },
        );
    }

    fn transmit(&mut self, connection: ConnectionId, frame: String) {
        match self.links.get(&connection) {
            Some(link) => {
                if link.outbound.send(frame).is_err() {
                    tracing::warn!(connection = %connection, "Link writer gone, frame dropped");
                }
            }
            None => {
                tracing::warn!(connection = %connection, "No link for outgoing frame");
            }
        }
    }

    fn spawn_fetch(&mut self, request: PageRequest) {
        let Some(provider) = self.history.clone() else {
            tracing::debug!("No history provider, reporting an empty page");
            self.post(SessionEvent::HistoryLoaded {
                request,
                page: HistoryPage::fetch_failed(),
            });
            return;
        };

        let user_id = self.user_id.clone();
        let loopback = self.loopback.clone();
        let task = tokio::spawn(
            async move {
                let page = provider.fetch_page(&user_id, request).await;
                let event = SessionEvent::HistoryLoaded { request, page };
                let _ = loopback.send(Inbound::Event(event));
            }
            .in_current_span(),
        );
        self.fetch = Some(AbortOnDrop(task));
    }

    fn arm_watchdog(&mut self, timer: TimerId, after: Duration) {
        let loopback = self.loopback.clone();
        let task = tokio::spawn(
            async move {
                tokio::time::sleep(after).await;
                let _ = loopback.send(Inbound::Event(SessionEvent::WatchdogFired { timer }));
            }
            .in_current_span(),
        );
        self.watchdog.arm(task);
    }

    fn start_ticker(&mut self, timer: TimerId, period: Duration) {
        let loopback = self.loopback.clone();
        let task = tokio::spawn(
            async move {
                let mut interval = interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    if loopback
                        .send(Inbound::Event(SessionEvent::StreamTick { timer }))
                        .is_err()
                    {
                        break;
                    }
                }
            }
            .in_current_span(),
        );
        self.ticker.arm(task);
    }

    async fn publish(&mut self, scroll: ScrollDirective) {
        if self.closing {
            return;
        }
        let update = ViewUpdate {
            snapshot: self.controller.snapshot(),
            scroll,
        };
        tokio::select! {
            biased;
            sent = self.views.send(update) => {
                if sent.is_err() {
                    tracing::trace!("View receiver dropped, render skipped");
                }
            }
            () = self.close_signal.notified() => {
                tracing::debug!("Close requested while the view channel was full");
                self.closing = true;
            }
        }
    }
}
