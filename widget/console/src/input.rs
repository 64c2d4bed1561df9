//! Input line parsing

/// What a line typed at the prompt asks for
#[derive(Debug, PartialEq, Eq)]
pub enum InputCommand<'a> {
    /// Send the text to the backend
    Send(&'a str),
    /// Load older history (`/older`)
    Older,
    /// Destroy the widget and exit (`/quit`)
    Quit,
    /// Unknown slash command
    Unknown(&'a str),
}

impl<'a> InputCommand<'a> {
    pub fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        match trimmed {
            "/older" => Self::Older,
            "/quit" | "/exit" => Self::Quit,
            // "//text" sends "/text"
            _ if trimmed.starts_with("//") => Self::Send(&trimmed[1..]),
            _ if trimmed.starts_with('/') => Self::Unknown(trimmed),
            _ => Self::Send(line),
        }
    }
}
