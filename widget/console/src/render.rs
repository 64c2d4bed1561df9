//! Transcript Rendering
//!
//! A terminal can only append, so each snapshot is diffed against what was
//! already written. New messages are printed as lines, the stream buffer is
//! written as it grows on a single open line, and history prepended by a
//! scroll-to-top is printed as a block between separators.

use widget_core::{Message, Role, ViewUpdate};

const EARLIER_SEPARATOR: &str = "──────── earlier messages ────────";
const LATEST_SEPARATOR: &str = "──────── latest ────────";

/// Append-only rendering state
#[derive(Debug, Default)]
pub struct Transcript {
    shown: Vec<Message>,
    /// Stream text already on the open line
    revealed: Option<String>,
    lines: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far; stands in for the scroll content height
    pub fn content_height(&self) -> f64 {
        self.lines as f64
    }

    /// Text to write for `update`
    pub fn render(&mut self, update: &ViewUpdate) -> String {
        let mut out = String::new();
        let messages = &update.snapshot.messages;

        if self.is_prepend(messages) {
            let added = messages.len() - self.shown.len();
            self.close_stream_line(&mut out);
            self.push_line(&mut out, EARLIER_SEPARATOR.to_string());
            for message in &messages[..added] {
                self.push_line(&mut out, format_message(message));
            }
            self.push_line(&mut out, LATEST_SEPARATOR.to_string());
        } else {
            let common = self
                .shown
                .iter()
                .zip(messages)
                .take_while(|(shown, current)| shown == current)
                .count();
            for message in &messages[common..] {
                self.write_message(message, &mut out);
            }
        }
        self.shown.clone_from(messages);

        if let Some(buffer) = &update.snapshot.stream_buffer {
            self.write_stream(buffer, &mut out);
        }
        out
    }

    fn is_prepend(&self, messages: &[Message]) -> bool {
        !self.shown.is_empty()
            && messages.len() > self.shown.len()
            && !messages.starts_with(&self.shown)
            && messages.ends_with(&self.shown)
    }

    fn write_message(&mut self, message: &Message, out: &mut String) {
        if let Some(revealed) = self.revealed.take() {
            // The finished stream lands in the log as a bot message
            if message.role == Role::Bot {
                if let Some(rest) = message.content.strip_prefix(revealed.as_str()) {
                    out.push_str(rest);
                    out.push('\n');
                    self.lines += 1;
                    return;
                }
            }
            out.push('\n');
            self.lines += 1;
        }
        self.push_line(out, format_message(message));
    }

    fn write_stream(&mut self, buffer: &str, out: &mut String) {
        let revealed = self.revealed.get_or_insert_with(|| {
            out.push_str(Role::BotStream.speaker());
            out.push_str(": ");
            String::new()
        });
        if let Some(rest) = buffer.strip_prefix(revealed.as_str()) {
            out.push_str(rest);
            revealed.push_str(rest);
        }
    }

    fn close_stream_line(&mut self, out: &mut String) {
        if self.revealed.take().is_some() {
            out.push('\n');
            self.lines += 1;
        }
    }

    fn push_line(&mut self, out: &mut String, line: String) {
        out.push_str(&line);
        out.push('\n');
        self.lines += 1;
    }
}

fn format_message(message: &Message) -> String {
    let speaker = message.role.speaker();
    match message.role {
        Role::User | Role::Bot | Role::BotStream => format!("{speaker}: {}", message.content),
        Role::BotProcessing => format!("{speaker} … {}", message.content),
        Role::BotError => format!("{speaker} ! {}", message.content),
    }
}
