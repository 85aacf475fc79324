use async_trait::async_trait;

use crate::{
    domain::{AttachmentKind, SubscriberId},
    messaging::types::{InlineKeyboard, MessagingCapabilities},
    Result,
};

/// Outbound transport port.
///
/// Every call may fail independently; callers decide whether a failure is
/// fatal (replies to an initiator) or isolated (broadcast deliveries).
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// Send a text message. `rich` enables HTML formatting.
    async fn send_text(&self, to: &SubscriberId, text: &str, rich: bool) -> Result<()>;

    async fn send_photo(&self, to: &SubscriberId, file_ref: &str, caption: Option<&str>)
        -> Result<()>;

    async fn send_document(
        &self,
        to: &SubscriberId,
        file_ref: &str,
        caption: Option<&str>,
    ) -> Result<()>;

    async fn send_video(&self, to: &SubscriberId, file_ref: &str, caption: Option<&str>)
        -> Result<()>;

    async fn send_keyboard(
        &self,
        to: &SubscriberId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()>;

    /// Acknowledge a selection (callback query), optionally with a toast.
    async fn answer_selection(&self, selection_id: &str, text: Option<&str>) -> Result<()>;

    /// Dispatch to the kind-appropriate send call.
    async fn send_attachment(
        &self,
        to: &SubscriberId,
        kind: AttachmentKind,
        file_ref: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        match kind {
            AttachmentKind::Photo => self.send_photo(to, file_ref, caption).await,
            AttachmentKind::Document => self.send_document(to, file_ref, caption).await,
            AttachmentKind::Video => self.send_video(to, file_ref, caption).await,
        }
    }
}
