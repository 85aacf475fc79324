//! Test doubles shared by the in-crate unit tests.

use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    path::PathBuf,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    config::{Config, StoreBackend},
    domain::{AttachmentKind, Language, SubscriberId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Text {
        to: SubscriberId,
        text: String,
    },
    Attachment {
        to: SubscriberId,
        kind: AttachmentKind,
        file_ref: String,
        caption: Option<String>,
    },
    Keyboard {
        to: SubscriberId,
        text: String,
        keyboard: InlineKeyboard,
    },
}

impl Sent {
    pub fn to(&self) -> &SubscriberId {
        match self {
            Sent::Text { to, .. } | Sent::Attachment { to, .. } | Sent::Keyboard { to, .. } => to,
        }
    }
}

/// Records every outbound call. Recipients in `failing` get an error,
/// recipients in `stalling` never answer within any sane timeout.
#[derive(Default)]
pub struct FakeMessenger {
    sent: Mutex<Vec<Sent>>,
    attempts: Mutex<HashMap<SubscriberId, usize>>,
    failing: Mutex<HashSet<SubscriberId>>,
    failing_attachments: Mutex<HashSet<SubscriberId>>,
    stalling: Mutex<HashSet<SubscriberId>>,
}

impl FakeMessenger {
    pub fn fail_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(SubscriberId::new(id));
    }

    pub fn fail_attachments_for(&self, id: &str) {
        self.failing_attachments
            .lock()
            .unwrap()
            .insert(SubscriberId::new(id));
    }

    pub fn stall_for(&self, id: &str) {
        self.stalling.lock().unwrap().insert(SubscriberId::new(id));
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, to: &SubscriberId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { to: t, text } if &t == to => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Number of calls (successful or not) addressed to `to`.
    pub fn attempts_to(&self, to: &SubscriberId) -> usize {
        self.attempts.lock().unwrap().get(to).copied().unwrap_or(0)
    }

    async fn record(&self, to: &SubscriberId, sent: Sent, attachment: bool) -> Result<()> {
        *self.attempts.lock().unwrap().entry(to.clone()).or_default() += 1;

        let stall = self.stalling.lock().unwrap().contains(to);
        if stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let fail = self.failing.lock().unwrap().contains(to)
            || (attachment && self.failing_attachments.lock().unwrap().contains(to));
        if fail {
            return Err(Error::Transport(format!("chat {to} is unreachable")));
        }
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_video: true,
            max_message_len: 4096,
            max_caption_len: 1024,
        }
    }

    async fn send_text(&self, to: &SubscriberId, text: &str, _rich: bool) -> Result<()> {
        if text.encode_utf16().count() > self.capabilities().max_message_len {
            *self.attempts.lock().unwrap().entry(to.clone()).or_default() += 1;
            return Err(Error::Transport("message is too long".to_string()));
        }
        let sent = Sent::Text {
            to: to.clone(),
            text: text.to_string(),
        };
        self.record(to, sent, false).await
    }

    async fn send_photo(
        &self,
        to: &SubscriberId,
        file_ref: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let sent = attachment(to, AttachmentKind::Photo, file_ref, caption);
        self.record(to, sent, true).await
    }

    async fn send_document(
        &self,
        to: &SubscriberId,
        file_ref: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let sent = attachment(to, AttachmentKind::Document, file_ref, caption);
        self.record(to, sent, true).await
    }

    async fn send_video(
        &self,
        to: &SubscriberId,
        file_ref: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let sent = attachment(to, AttachmentKind::Video, file_ref, caption);
        self.record(to, sent, true).await
    }

    async fn send_keyboard(
        &self,
        to: &SubscriberId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        let sent = Sent::Keyboard {
            to: to.clone(),
            text: text.to_string(),
            keyboard,
        };
        self.record(to, sent, false).await
    }

    async fn answer_selection(&self, _selection_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }
}

fn attachment(to: &SubscriberId, kind: AttachmentKind, file_ref: &str, caption: Option<&str>) -> Sent {
    Sent::Attachment {
        to: to.clone(),
        kind,
        file_ref: file_ref.to_string(),
        caption: caption.map(|s| s.to_string()),
    }
}

pub fn test_config() -> Config {
    Config {
        telegram_bot_token: "x".to_string(),
        admin_ids: vec![SubscriberId::new("1")],
        default_language: Language::En,
        store: StoreBackend::Memory,
        http_enabled: false,
        http_bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        http_author_id: SubscriberId::new("http-api"),
        delivery_timeout: Duration::from_millis(200),
        broadcast_concurrency: 4,
        recent_page_size: 2,
        active_window: Duration::from_secs(24 * 3600),
        audit_log_path: PathBuf::from(format!("/tmp/ntb-audit-test-{}.log", std::process::id())),
        audit_log_json: true,
    }
}

/// First construct in `html` that Telegram's HTML parse mode would reject.
pub fn telegram_html_error(html: &str) -> Option<String> {
    const TAGS: [&str; 4] = ["b", "i", "code", "pre"];
    const ENTITIES: [&str; 4] = ["&lt;", "&gt;", "&amp;", "&quot;"];

    let mut rest = html;
    while let Some(pos) = rest.find(['<', '&']) {
        let tail = &rest[pos..];
        if tail.starts_with('&') {
            if !ENTITIES.iter().any(|e| tail.starts_with(e)) {
                return Some(format!("bare '&' in {html:?}"));
            }
            rest = &tail[1..];
            continue;
        }
        let Some(end) = tail.find('>') else {
            return Some(format!("unclosed '<' in {html:?}"));
        };
        let name = tail[1..end].trim_start_matches('/');
        if !TAGS.contains(&name) {
            return Some(format!("unsupported tag <{}> in {html:?}", &tail[1..end]));
        }
        rest = &tail[end + 1..];
    }
    None
}
