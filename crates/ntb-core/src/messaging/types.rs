use crate::domain::{AttachmentKind, SubscriberId};

/// Cross-messenger incoming update model.
///
/// Telegram-specific fields live in the Telegram adapter.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Command(Command),
    Text(TextMessage),
    Selection(Selection),
    File(FileUpload),
}

impl IncomingUpdate {
    pub fn sender(&self) -> &Sender {
        match self {
            IncomingUpdate::Command(c) => &c.sender,
            IncomingUpdate::Text(t) => &t.sender,
            IncomingUpdate::Selection(s) => &s.sender,
            IncomingUpdate::File(f) => &f.sender,
        }
    }
}

/// Who sent an update. `id` doubles as the reply address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub id: SubscriberId,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

impl Sender {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: SubscriberId::new(id),
            username: None,
            display_name: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Command {
    pub sender: Sender,
    /// Lowercased command name without the leading `/` or `@botname`.
    pub name: String,
    pub args: String,
}

impl Command {
    /// Parse `/cmd@botname arg1 ...`; `None` if `text` is not a command.
    pub fn parse(sender: Sender, text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }
        let mut parts = text.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or("");
        let args = parts.next().unwrap_or("").trim().to_string();

        let name = first
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();
        if name.is_empty() {
            return None;
        }

        Some(Self { sender, name, args })
    }
}

#[derive(Clone, Debug)]
pub struct TextMessage {
    pub sender: Sender,
    pub text: String,
}

/// An out-of-band choice (inline button press).
#[derive(Clone, Debug)]
pub struct Selection {
    pub sender: Sender,
    pub data: String,
}

#[derive(Clone, Debug)]
pub struct FileUpload {
    pub sender: Sender,
    pub kind: AttachmentKind,
    /// Transport file reference, already resolved to the largest size offered.
    pub file_ref: String,
}

/// Inline keyboard, laid out in rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Lay buttons out `per_row` at a time.
    pub fn grid(buttons: Vec<InlineButton>, per_row: usize) -> Self {
        let per_row = per_row.max(1);
        let mut rows = Vec::new();
        let mut row = Vec::new();
        for b in buttons {
            row.push(b);
            if row.len() == per_row {
                rows.push(std::mem::take(&mut row));
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
        Self { rows }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

/// A message addressed back to the initiator of an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_video: bool,
    pub max_message_len: usize,
    pub max_caption_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_bot_suffix_and_args() {
        let c = Command::parse(Sender::new("1"), "/AddAdmin@campus_bot  12345 ").unwrap();
        assert_eq!(c.name, "addadmin");
        assert_eq!(c.args, "12345");

        assert!(Command::parse(Sender::new("1"), "hello").is_none());
        assert!(Command::parse(Sender::new("1"), "/").is_none());
    }

    #[test]
    fn grid_layout() {
        let buttons = (0..5)
            .map(|i| InlineButton::new(i.to_string(), i.to_string()))
            .collect();
        let kb = InlineKeyboard::grid(buttons, 2);
        assert_eq!(
            kb.rows.iter().map(|r| r.len()).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
        assert_eq!(kb.buttons().count(), 5);
    }
}
