//! Translation of Telegram updates into the core's [`IncomingUpdate`] model.

use teloxide::types::{CallbackQuery, Message, User};

use ntb_core::{
    domain::AttachmentKind,
    messaging::types::{Command, FileUpload, IncomingUpdate, Selection, Sender, TextMessage},
};

pub fn sender_of(user: &User) -> Sender {
    let full_name = user.full_name();
    Sender {
        id: (user.id.0 as i64).into(),
        username: user.username.clone(),
        display_name: (!full_name.trim().is_empty()).then_some(full_name),
    }
}

/// Sender of a message; falls back to the chat for anonymous posts.
fn message_sender(msg: &Message) -> Sender {
    match msg.from() {
        Some(user) => sender_of(user),
        None => Sender::new(msg.chat.id.0.to_string()),
    }
}

/// `None` for message kinds the bot does not handle (stickers, voice, ...).
pub fn from_message(msg: &Message) -> Option<IncomingUpdate> {
    let sender = message_sender(msg);

    if let Some(text) = msg.text() {
        if let Some(cmd) = Command::parse(sender.clone(), text) {
            return Some(IncomingUpdate::Command(cmd));
        }
        return Some(IncomingUpdate::Text(TextMessage {
            sender,
            text: text.to_string(),
        }));
    }

    // Telegram lists photo sizes smallest first.
    let (kind, file_ref) = if let Some(sizes) = msg.photo() {
        (AttachmentKind::Photo, sizes.last()?.file.id.clone())
    } else if let Some(doc) = msg.document() {
        (AttachmentKind::Document, doc.file.id.clone())
    } else if let Some(video) = msg.video() {
        (AttachmentKind::Video, video.file.id.clone())
    } else {
        return None;
    };

    Some(IncomingUpdate::File(FileUpload {
        sender,
        kind,
        file_ref,
    }))
}

/// `None` when the button carried no data.
pub fn from_callback(q: &CallbackQuery) -> Option<IncomingUpdate> {
    let data = q.data.as_deref().filter(|d| !d.is_empty())?;
    Some(IncomingUpdate::Selection(Selection {
        sender: sender_of(&q.from),
        data: data.to_string(),
    }))
}
