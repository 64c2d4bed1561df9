//! Conversation Messages
//!
//! The ordered message log that the presentation layer renders. The log is
//! the single source of truth for what is on screen; only the session
//! controller mutates it.
//!
//! # Ordering Rules
//!
//! - Live messages are appended at the end
//! - History pages are prepended at the front
//! - At most one `BotProcessing` entry exists; a new status replaces the old
//!   one instead of stacking
//! - Entries are never edited in place

use std::fmt;

use serde::{Deserialize, Serialize};

/// Text of the notice shown when a decoded frame is unusable
pub const INVALID_RESPONSE_TEXT: &str = "Invalid server response.";

/// Text shown when the connection itself fails
pub const CONNECTION_ERROR_TEXT: &str = "Connection error occurred.";

/// Text shown when a send was refused and will not be retried automatically
pub const RESEND_REQUIRED_TEXT: &str = "Connection was not ready. Please send your message again.";

/// Escalated status text once the processing watchdog fires
pub const STILL_WORKING_TEXT: &str = "Still working… this is taking longer than usual.";

/// Greeting placed at the top of a fresh log
pub const DEFAULT_WELCOME_TEXT: &str =
    "Hello! I am your helping hand. How can I assist you today?";

/// Who (or what) produced a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Typed by the user
    User,
    /// A final bot answer
    Bot,
    /// Transient status while the backend works on a query
    BotProcessing,
    /// Inline error notice
    BotError,
    /// The in-flight stream buffer (never stored in the log)
    BotStream,
}

impl Role {
    /// Wire/tag name of the role
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
            Self::BotProcessing => "bot-processing",
            Self::BotError => "bot-error",
            Self::BotStream => "bot-stream",
        }
    }

    /// Speaker label shown above a bubble
    #[must_use]
    pub fn speaker(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Bot | Self::BotProcessing | Self::BotError | Self::BotStream => "Bot",
        }
    }

    /// Whether the message came from the bot side
    #[must_use]
    pub fn is_bot(self) -> bool {
        !matches!(self, Self::User)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of the conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,
    /// Message content
    pub content: String,
}

impl Message {
    /// Create a message with an explicit role
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// A user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// A final bot answer
    pub fn bot(content: impl Into<String>) -> Self {
        Self::new(Role::Bot, content)
    }

    /// A processing status line
    pub fn processing(content: impl Into<String>) -> Self {
        Self::new(Role::BotProcessing, content)
    }

    /// An inline error notice
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::BotError, content)
    }
}

/// Ordered conversation log with the single processing slot invariant
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log seeded with the welcome message
    pub fn with_welcome(welcome: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::bot(welcome)],
        }
    }

    /// Append a message at the end
    ///
    /// Processing entries must go through [`MessageLog::replace_processing`].
    pub fn push(&mut self, message: Message) {
        debug_assert!(message.role != Role::BotProcessing);
        debug_assert!(message.role != Role::BotStream);
        self.messages.push(message);
    }

    /// Drop any processing entry and append a fresh one at the end
    pub fn replace_processing(&mut self, content: impl Into<String>) {
        self.clear_processing();
        self.messages.push(Message::processing(content));
    }

    /// Remove the processing entry, returning whether one existed
    pub fn clear_processing(&mut self) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.role != Role::BotProcessing);
        before != self.messages.len()
    }

    /// The current processing entry, if any
    #[must_use]
    pub fn processing(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::BotProcessing)
    }

    /// Insert older messages before everything already present
    pub fn prepend(&mut self, older: Vec<Message>) {
        if older.is_empty() {
            return;
        }
        self.messages.splice(0..0, older);
    }

    /// All messages in display order
    #[must_use]
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// Iterate messages in display order
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Last message, if any
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Count of messages with the given role
    #[must_use]
    pub fn count_role(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }
}
