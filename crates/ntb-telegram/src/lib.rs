//! Telegram adapter (teloxide).
//!
//! This crate implements the `ntb-core` MessagingPort over the Telegram Bot API
//! and feeds incoming updates to the core dispatcher.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode},
};

use tokio::time::sleep;
use tracing::warn;

pub mod router;
pub mod updates;

use ntb_core::{
    domain::SubscriberId,
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Transport(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        warn!(retry_after_secs = d.as_secs(), "telegram asked us to back off");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

/// Subscriber ids are Telegram user ids, which double as private chat ids.
pub fn tg_chat(id: &SubscriberId) -> Result<ChatId> {
    id.as_str()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| Error::Transport(format!("not a telegram chat id: {id}")))
}

fn tg_markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.into_iter().map(|row| {
        row.into_iter()
            .map(|b| InlineKeyboardButton::callback(b.label, b.callback_data))
            .collect::<Vec<_>>()
    }))
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_video: true,
            max_message_len: 4096,
            max_caption_len: 1024,
        }
    }

    async fn send_text(&self, to: &SubscriberId, text: &str, rich: bool) -> Result<()> {
        let chat = tg_chat(to)?;
        self.with_retry(|| {
            let req = self.bot.send_message(chat, text.to_string());
            if rich {
                req.parse_mode(ParseMode::Html)
            } else {
                req
            }
        })
        .await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        to: &SubscriberId,
        file_ref: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let chat = tg_chat(to)?;
        self.with_retry(|| {
            let mut req = self
                .bot
                .send_photo(chat, InputFile::file_id(file_ref.to_string()));
            if let Some(c) = caption {
                req = req.caption(c.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn send_document(
        &self,
        to: &SubscriberId,
        file_ref: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let chat = tg_chat(to)?;
        self.with_retry(|| {
            let mut req = self
                .bot
                .send_document(chat, InputFile::file_id(file_ref.to_string()));
            if let Some(c) = caption {
                req = req.caption(c.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn send_video(
        &self,
        to: &SubscriberId,
        file_ref: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let chat = tg_chat(to)?;
        self.with_retry(|| {
            let mut req = self
                .bot
                .send_video(chat, InputFile::file_id(file_ref.to_string()));
            if let Some(c) = caption {
                req = req.caption(c.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn send_keyboard(
        &self,
        to: &SubscriberId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        let chat = tg_chat(to)?;
        let markup = tg_markup(keyboard);
        self.with_retry(|| {
            self.bot
                .send_message(chat, text.to_string())
                .parse_mode(ParseMode::Html)
                .reply_markup(markup.clone())
        })
        .await?;
        Ok(())
    }

    async fn answer_selection(&self, selection_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(selection_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}
