//! Embedding Surface
//!
//! [`init`] mounts one widget session and hands back an opaque
//! [`WidgetHandle`] plus the stream of [`ViewUpdate`]s the presentation
//! layer renders. Several widgets can live side by side; each handle owns
//! its own session task and nothing is shared between them.
//!
//! # Example
//!
//! ```ignore
//! let config = load_config()?;
//! let (handle, mut views) = init(&config, InitConfig::new("tok", "user-1"))?;
//!
//! handle.open()?;
//! handle.send("hi")?;
//! while let Some(update) = views.recv().await {
//!     render(&update);
//! }
//! handle.destroy().await;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::WidgetConfig;
use crate::history::HistoryProvider;
use crate::session::{
    CommandSender, SessionCommand, SessionController, SessionDriver, SessionError, ViewUpdate,
};
use crate::transport::Connector;

/// Container used when the host names none
pub const DEFAULT_CONTAINER_ID: &str = "chatbot-widget-root";

/// Capacity of the view update channel
pub const VIEW_CHANNEL_CAPACITY: usize = 100;

/// Visual overrides, carried through to the presentation layer untouched
///
/// Only `initial_message` affects the session: when present and not blank
/// it replaces the configured welcome message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Theme {
    /// Primary accent color
    pub primary: Option<String>,
    /// Secondary accent color
    pub secondary: Option<String>,
    /// Default text color
    pub text_color: Option<String>,
    /// Background of user bubbles
    pub user_bubble_color: Option<String>,
    /// Text color of user bubbles
    pub user_text_color: Option<String>,
    /// Background of bot bubbles
    pub bot_bubble_color: Option<String>,
    /// Text color of bot bubbles
    pub bot_text_color: Option<String>,
    /// Bubble corner radius
    pub border_radius: Option<String>,
    /// Font family
    pub font_family: Option<String>,
    /// Replaces the welcome message when not blank
    pub initial_message: Option<String>,
}

/// What the host passes to [`init`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InitConfig {
    /// Auth token sent on every new connection
    pub token: String,
    /// User whose history is fetched
    pub user_id: String,
    /// Where the host mounts the widget
    pub container_id: Option<String>,
    /// Visual overrides
    pub theme: Option<Theme>,
}

impl InitConfig {
    /// Create an init config with no container or theme
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            container_id: None,
            theme: None,
        }
    }

    /// Set the container id
    #[must_use]
    pub fn with_container(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    /// Set the theme
    #[must_use]
    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = Some(theme);
        self
    }
}

/// Why a widget could not be mounted
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InitError {
    /// No token, or only whitespace
    #[error("token is required")]
    MissingToken,

    /// No user id, or only whitespace
    #[error("user id is required")]
    MissingUserId,

    /// The allow-list is set and does not contain this user
    #[error("user {user_id} is not allowed to use the widget")]
    UserNotAllowed {
        /// The rejected user id
        user_id: String,
    },

    /// Called outside a tokio runtime
    #[error("widget must be initialized inside a tokio runtime")]
    NoRuntime,
}

/// Mount a widget against the configured backend
///
/// # Errors
///
/// See [`InitError`]. Nothing connects or renders when this fails.
#[cfg(feature = "websocket")]
pub fn init(
    config: &WidgetConfig,
    init: InitConfig,
) -> Result<(WidgetHandle, mpsc::Receiver<ViewUpdate>), InitError> {
    use crate::history::HttpHistoryProvider;
    use crate::transport::WebSocketConnector;

    let connector = WebSocketConnector::new(config.socket_url.clone());
    let history = config.history_url.as_ref().map(|url| {
        let provider: Arc<dyn HistoryProvider> = Arc::new(HttpHistoryProvider::new(url.clone()));
        provider
    });
    init_with(config, init, Arc::new(connector), history)
}

/// Mount a widget over the given transport and history source
///
/// `config` supplies the allow-list and session settings; its URLs are not
/// used. Without a history provider the widget never paginates.
///
/// # Errors
///
/// See [`InitError`]. Nothing connects or renders when this fails.
pub fn init_with(
    config: &WidgetConfig,
    init: InitConfig,
    connector: Arc<dyn Connector>,
    history: Option<Arc<dyn HistoryProvider>>,
) -> Result<(WidgetHandle, mpsc::Receiver<ViewUpdate>), InitError> {
    let token = init.token.trim();
    if token.is_empty() {
        return Err(InitError::MissingToken);
    }
    let user_id = init.user_id.trim();
    if user_id.is_empty() {
        return Err(InitError::MissingUserId);
    }
    if !config.is_user_allowed(user_id) {
        tracing::warn!(user_id, "User not on the allow-list, widget not mounted");
        return Err(InitError::UserNotAllowed {
            user_id: user_id.to_string(),
        });
    }
    let runtime = Handle::try_current().map_err(|_| InitError::NoRuntime)?;

    let theme = init.theme.unwrap_or_default();
    let mut settings = config.session.clone();
    if let Some(welcome) = theme.initial_message.as_deref() {
        if !welcome.trim().is_empty() {
            settings.welcome_message = welcome.to_string();
        }
    }
    let connect_timeout = settings.connect_timeout;

    let (views_tx, views_rx) = mpsc::channel(VIEW_CHANNEL_CAPACITY);
    let controller = SessionController::new(token, settings, history.is_some());
    let mut driver =
        SessionDriver::new(controller, connector, views_tx).with_connect_timeout(connect_timeout);
    if let Some(provider) = history {
        driver = driver.with_history(provider, user_id);
    }

    let id = driver.session_id();
    let commands = driver.commands();
    let container_id = init
        .container_id
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONTAINER_ID.to_string());

    let task = runtime.spawn(driver.run());
    tracing::info!(session_id = %id, user_id, container = %container_id, "Widget mounted");

    let handle = WidgetHandle {
        id,
        commands,
        task: Some(task),
        theme,
        container_id,
    };
    Ok((handle, views_rx))
}

/// Opaque handle to one mounted widget
///
/// Dropping the handle tears the session down; [`WidgetHandle::destroy`]
/// does the same and waits for it to finish.
#[derive(Debug)]
pub struct WidgetHandle {
    id: Uuid,
    commands: CommandSender,
    task: Option<JoinHandle<()>>,
    theme: Theme,
    container_id: String,
}

impl WidgetHandle {
    /// Session id, as it appears in logs
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Theme given at init
    #[must_use]
    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    /// Container the widget is mounted in
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Whether the session has stopped
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.commands.is_closed()
    }

    /// The widget was opened: load history and connect
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] after the session stopped.
    pub fn open(&self) -> Result<(), SessionError> {
        self.commands.send(SessionCommand::Open)
    }

    /// Submit user text
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] after the session stopped.
    pub fn send(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.commands.send(SessionCommand::Send(text.into()))
    }

    /// The user scrolled to the top; `content_height` is the current
    /// height of the scroll content
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] after the session stopped.
    pub fn scroll_to_top(&self, content_height: f64) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::ScrollToTop { content_height })
    }

    /// Tear the session down and wait for it to stop
    pub async fn destroy(mut self) {
        let _ = self.commands.send(SessionCommand::Close);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(session_id = %self.id, error = %e, "Session task ended abnormally");
            }
        }
        tracing::info!(session_id = %self.id, "Widget destroyed");
    }
}

impl Drop for WidgetHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(SessionCommand::Close);
        }
    }
}
