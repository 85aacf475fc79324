//! Multi-step announcement composer.
//!
//! `Title -> Message -> Category -> Attachments -> (Schedule | publish)`.
//! One draft per initiator; `/announce` again replaces it. Any error while a
//! step runs drops the draft.

use std::{future::Future, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    audit::AuditEvent,
    domain::{Attachment, AttachmentKind, Category, Language, NewAnnouncement, SubscriberId},
    errors::{Error, ValidationError},
    formatting::format_datetime,
    messaging::types::{InlineButton, InlineKeyboard, Reply},
    scheduler::{parse_schedule_input, ScheduleInputError, ScheduledJob},
    services::Services,
    session::SessionStore,
    validation::{validate, AnnouncementInput},
    Result,
};

pub const CATEGORY_PREFIX: &str = "cat:";
pub const ATTACHMENTS_DONE: &str = "att:done";
pub const ATTACHMENTS_SCHEDULE: &str = "att:schedule";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftStep {
    Title,
    Message,
    Category,
    Attachments,
    Schedule,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub step: DraftStep,
    pub title: String,
    pub body: String,
    pub category: Option<Category>,
    pub attachments: Vec<Attachment>,
    /// Initiator's language when the draft was started.
    pub language: Language,
}

impl Draft {
    pub fn new(language: Language) -> Self {
        Self {
            step: DraftStep::Title,
            title: String::new(),
            body: String::new(),
            category: None,
            attachments: Vec::new(),
            language,
        }
    }

    pub fn to_announcement(
        &self,
        created_by: &SubscriberId,
    ) -> std::result::Result<NewAnnouncement, ValidationError> {
        validate(
            AnnouncementInput {
                title: Some(&self.title),
                body: Some(&self.body),
                tag: self.category.map(Category::tag),
            },
            self.attachments.clone(),
            created_by.clone(),
        )
    }
}

pub struct ConversationMachine {
    drafts: Arc<dyn SessionStore<Draft>>,
    services: Services,
}

impl ConversationMachine {
    pub fn new(drafts: Arc<dyn SessionStore<Draft>>, services: Services) -> Self {
        Self { drafts, services }
    }

    pub async fn draft_of(&self, initiator: &SubscriberId) -> Result<Option<Draft>> {
        self.drafts.get(initiator).await
    }

    /// Start (or restart) a draft. Non-admins are turned away without state.
    pub async fn begin(&self, initiator: &SubscriberId, lang: Language) -> Result<Vec<Reply>> {
        match self.services.admin.ensure_admin(initiator).await {
            Ok(()) => {}
            Err(Error::Unauthorized(_)) => {
                return Ok(vec![self.reply(lang, "not_authorized_announce")])
            }
            Err(e) => return Err(e),
        }
        self.drafts.set(initiator, Draft::new(lang)).await?;
        debug!(initiator = %initiator, "draft started");
        Ok(vec![self.reply(lang, "enter_title")])
    }

    /// `None` when the initiator has no open draft.
    pub async fn on_text(
        &self,
        initiator: &SubscriberId,
        text: &str,
    ) -> Result<Option<Vec<Reply>>> {
        let Some(draft) = self.drafts.get(initiator).await? else {
            return Ok(None);
        };
        self.guarded(initiator, self.text_step(initiator, draft, text))
            .await
            .map(Some)
    }

    pub async fn on_selection(
        &self,
        initiator: &SubscriberId,
        data: &str,
    ) -> Result<Option<Vec<Reply>>> {
        let Some(draft) = self.drafts.get(initiator).await? else {
            return Ok(None);
        };
        self.guarded(initiator, self.selection_step(initiator, draft, data))
            .await
            .map(Some)
    }

    pub async fn on_file(
        &self,
        initiator: &SubscriberId,
        kind: AttachmentKind,
        file_ref: &str,
    ) -> Result<Option<Vec<Reply>>> {
        let Some(mut draft) = self.drafts.get(initiator).await? else {
            return Ok(None);
        };
        if draft.step != DraftStep::Attachments {
            return Ok(Some(Vec::new()));
        }

        draft.attachments.push(Attachment {
            kind,
            file_ref: file_ref.to_string(),
        });
        let lang = draft.language;
        self.guarded(initiator, self.drafts.set(initiator, draft))
            .await?;

        let key = match kind {
            AttachmentKind::Photo => "photo_attached",
            AttachmentKind::Document => "document_attached",
            AttachmentKind::Video => "video_attached",
        };
        Ok(Some(vec![self.reply(lang, key)]))
    }

    async fn text_step(
        &self,
        initiator: &SubscriberId,
        mut draft: Draft,
        text: &str,
    ) -> Result<Vec<Reply>> {
        let lang = draft.language;
        match draft.step {
            DraftStep::Title => {
                draft.title = text.to_string();
                draft.step = DraftStep::Message;
                self.drafts.set(initiator, draft).await?;
                Ok(vec![self.reply(lang, "enter_message")])
            }
            DraftStep::Message => {
                draft.body = text.to_string();
                draft.step = DraftStep::Category;
                self.drafts.set(initiator, draft).await?;
                Ok(vec![Reply::with_keyboard(
                    self.services.i18n.text(lang, "select_category"),
                    self.category_keyboard(lang),
                )])
            }
            DraftStep::Category | DraftStep::Attachments => Ok(Vec::new()),
            DraftStep::Schedule => self.schedule(initiator, draft, text).await,
        }
    }

    async fn selection_step(
        &self,
        initiator: &SubscriberId,
        mut draft: Draft,
        data: &str,
    ) -> Result<Vec<Reply>> {
        let lang = draft.language;
        match draft.step {
            DraftStep::Category => {
                let Some(category) = data
                    .strip_prefix(CATEGORY_PREFIX)
                    .and_then(Category::from_tag)
                else {
                    return Ok(Vec::new());
                };
                draft.category = Some(category);
                draft.step = DraftStep::Attachments;
                self.drafts.set(initiator, draft).await?;
                Ok(vec![Reply::with_keyboard(
                    self.services.i18n.text(lang, "attachments_prompt"),
                    self.attachments_keyboard(lang),
                )])
            }
            DraftStep::Attachments if data == ATTACHMENTS_DONE => {
                self.drafts.remove(initiator).await?;
                self.finalize(initiator, draft).await
            }
            DraftStep::Attachments if data == ATTACHMENTS_SCHEDULE => {
                if let Err(e) = draft.to_announcement(initiator) {
                    self.drafts.remove(initiator).await?;
                    return Ok(vec![self.validation_reply(lang, &e)]);
                }
                draft.step = DraftStep::Schedule;
                self.drafts.set(initiator, draft).await?;
                Ok(vec![self.reply(lang, "enter_schedule")])
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn finalize(&self, initiator: &SubscriberId, draft: Draft) -> Result<Vec<Reply>> {
        let lang = draft.language;
        let new = match draft.to_announcement(initiator) {
            Ok(new) => new,
            Err(e) => return Ok(vec![self.validation_reply(lang, &e)]),
        };

        let published = self.services.publisher.publish(new).await?;
        Ok(vec![Reply::text(self.services.i18n.text_with(
            lang,
            "announcement_sent",
            &[
                ("delivered", &published.report.delivered.to_string()),
                ("attempted", &published.report.attempted.to_string()),
            ],
        ))])
    }

    async fn schedule(
        &self,
        initiator: &SubscriberId,
        draft: Draft,
        text: &str,
    ) -> Result<Vec<Reply>> {
        let lang = draft.language;
        let due_at = match parse_schedule_input(text, Utc::now()) {
            Ok(at) => at,
            Err(ScheduleInputError::Invalid(_)) => return Ok(vec![self.reply(lang, "invalid_date")]),
            Err(ScheduleInputError::NotInFuture(_)) => {
                return Ok(vec![self.reply(lang, "date_in_past")])
            }
        };

        let announcement = draft.to_announcement(initiator)?;
        let title = announcement.title.clone();
        self.services
            .scheduler
            .schedule_at(ScheduledJob {
                due_at,
                requested_by: initiator.clone(),
                language: lang,
                announcement,
            })
            .await;
        self.drafts.remove(initiator).await?;
        self.services.audit.record(AuditEvent::scheduled(
            initiator,
            &title,
            &due_at.to_rfc3339(),
        ));

        Ok(vec![Reply::text(self.services.i18n.text_with(
            lang,
            "scheduled_confirmation",
            &[("when", &format_datetime(due_at, lang))],
        ))])
    }

    async fn guarded<T, F>(&self, initiator: &SubscriberId, step: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match step.await {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!(initiator = %initiator, error = %e, "draft step failed, discarding draft");
                if let Err(rm) = self.drafts.remove(initiator).await {
                    warn!(initiator = %initiator, error = %rm, "failed to discard draft");
                }
                Err(e)
            }
        }
    }

    fn reply(&self, lang: Language, key: &str) -> Reply {
        Reply::text(self.services.i18n.text(lang, key))
    }

    fn validation_reply(&self, lang: Language, e: &ValidationError) -> Reply {
        Reply::text(self.services.i18n.text_with(
            lang,
            "error_prefix",
            &[("error", &e.to_string())],
        ))
    }

    fn category_keyboard(&self, lang: Language) -> InlineKeyboard {
        let buttons = Category::ALL
            .iter()
            .map(|c| {
                InlineButton::new(
                    format!("{} {}", c.emoji(), self.services.i18n.category_label(lang, *c)),
                    format!("{CATEGORY_PREFIX}{}", c.tag()),
                )
            })
            .collect();
        InlineKeyboard::grid(buttons, 2)
    }

    fn attachments_keyboard(&self, lang: Language) -> InlineKeyboard {
        InlineKeyboard::new(vec![vec![
            InlineButton::new(self.services.i18n.text(lang, "button_done"), ATTACHMENTS_DONE),
            InlineButton::new(
                self.services.i18n.text(lang, "button_schedule"),
                ATTACHMENTS_SCHEDULE,
            ),
        ]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Announcement, AnnouncementId},
        errors::Error,
        session::MemorySessionStore,
        store::{AnnouncementStore, MemoryStore},
        testing::{test_config, FakeMessenger},
    };
    use async_trait::async_trait;

    struct Harness {
        machine: ConversationMachine,
        store: Arc<MemoryStore>,
        fake: Arc<FakeMessenger>,
        services: Services,
    }

    async fn harness_with(announcements: Option<Arc<dyn AnnouncementStore>>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let fake = Arc::new(FakeMessenger::default());
        let announcements = announcements.unwrap_or_else(|| store.clone());
        let services = Services::new(
            Arc::new(test_config()),
            store.clone(),
            announcements,
            fake.clone(),
        );
        for id in ["1", "2"] {
            services
                .directory
                .upsert_on_interaction(&SubscriberId::new(id), None)
                .await
                .unwrap();
        }
        let machine = ConversationMachine::new(
            Arc::new(MemorySessionStore::<Draft>::new()),
            services.clone(),
        );
        Harness {
            machine,
            store,
            fake,
            services,
        }
    }

    async fn harness() -> Harness {
        harness_with(None).await
    }

    fn admin() -> SubscriberId {
        SubscriberId::new("1")
    }

    async fn fill(h: &Harness, title: &str, body: &str, tag: &str) {
        let me = admin();
        h.machine.begin(&me, Language::En).await.unwrap();
        h.machine.on_text(&me, title).await.unwrap();
        h.machine.on_text(&me, body).await.unwrap();
        h.machine
            .on_selection(&me, &format!("{CATEGORY_PREFIX}{tag}"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn complete_draft_persists_once_and_broadcasts_to_everyone() {
        let h = harness().await;
        fill(&h, "Midterm", "Midterms start next week in all halls.", "academic").await;

        let replies = h
            .machine
            .on_selection(&admin(), ATTACHMENTS_DONE)
            .await
            .unwrap()
            .unwrap();
        assert!(replies[0].text.contains("Delivered to 2 of 2"));

        let stored = h.store.recent(0, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category, Category::Academic);
        assert_eq!(stored[0].title, "Midterm");
        assert_eq!(stored[0].created_by, admin());
        for id in ["1", "2"] {
            assert_eq!(h.fake.texts_to(&SubscriberId::new(id)).len(), 1);
        }
        assert!(h.machine.draft_of(&admin()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_admin_cannot_start_a_draft() {
        let h = harness().await;
        let student = SubscriberId::new("2");

        let replies = h.machine.begin(&student, Language::En).await.unwrap();
        assert!(replies[0].text.contains("not authorized"));
        assert!(h.machine.draft_of(&student).await.unwrap().is_none());
        assert!(h.machine.on_text(&student, "hello").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn short_title_is_rejected_and_draft_destroyed() {
        let h = harness().await;
        fill(&h, "Hi", "Midterms start next week in all halls.", "academic").await;

        let replies = h
            .machine
            .on_selection(&admin(), ATTACHMENTS_DONE)
            .await
            .unwrap()
            .unwrap();
        assert!(replies[0]
            .text
            .contains("Title must be at least 3 characters long"));
        assert_eq!(h.store.count().await.unwrap(), 0);
        assert!(h.machine.draft_of(&admin()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn category_step_ignores_text_and_unknown_tags() {
        let h = harness().await;
        let me = admin();
        h.machine.begin(&me, Language::En).await.unwrap();
        h.machine.on_text(&me, "Midterm").await.unwrap();
        let replies = h
            .machine
            .on_text(&me, "Midterms start next week in all halls.")
            .await
            .unwrap()
            .unwrap();
        let kb = replies[0].keyboard.as_ref().unwrap();
        assert_eq!(kb.buttons().count(), 6);

        assert_eq!(h.machine.on_text(&me, "sports").await.unwrap(), Some(vec![]));
        assert_eq!(
            h.machine.on_selection(&me, "cat:music").await.unwrap(),
            Some(vec![])
        );
        assert_eq!(
            h.machine.draft_of(&me).await.unwrap().unwrap().step,
            DraftStep::Category
        );
    }

    #[tokio::test]
    async fn attachments_are_collected_in_order_only_in_that_step() {
        let h = harness().await;
        let me = admin();
        h.machine.begin(&me, Language::En).await.unwrap();
        assert_eq!(
            h.machine
                .on_file(&me, AttachmentKind::Photo, "early")
                .await
                .unwrap(),
            Some(vec![])
        );

        h.machine.on_text(&me, "Midterm").await.unwrap();
        h.machine
            .on_text(&me, "Midterms start next week in all halls.")
            .await
            .unwrap();
        h.machine.on_selection(&me, "cat:academic").await.unwrap();
        h.machine
            .on_file(&me, AttachmentKind::Photo, "big-photo")
            .await
            .unwrap();
        let replies = h
            .machine
            .on_file(&me, AttachmentKind::Document, "doc")
            .await
            .unwrap()
            .unwrap();
        assert!(replies[0].text.contains("Document attached"));

        h.machine.on_selection(&me, ATTACHMENTS_DONE).await.unwrap();
        let stored = &h.store.recent(0, 1).await.unwrap()[0];
        let refs: Vec<_> = stored
            .attachments
            .iter()
            .map(|a| a.file_ref.as_str())
            .collect();
        assert_eq!(refs, vec!["big-photo", "doc"]);
    }

    #[tokio::test]
    async fn restarting_replaces_the_previous_draft() {
        let h = harness().await;
        let me = admin();
        h.machine.begin(&me, Language::En).await.unwrap();
        h.machine.on_text(&me, "First title").await.unwrap();
        h.machine.begin(&me, Language::Fr).await.unwrap();

        let d = h.machine.draft_of(&me).await.unwrap().unwrap();
        assert_eq!(d.step, DraftStep::Title);
        assert!(d.title.is_empty());
        assert_eq!(d.language, Language::Fr);
    }

    #[tokio::test]
    async fn bad_schedule_input_keeps_state_until_a_valid_time_arrives() {
        let h = harness().await;
        let me = admin();
        fill(&h, "Fair", "Career fair on Monday in the hall.", "events").await;
        let replies = h
            .machine
            .on_selection(&me, ATTACHMENTS_SCHEDULE)
            .await
            .unwrap()
            .unwrap();
        assert!(replies[0].text.contains("YYYY-MM-DD"));

        let replies = h.machine.on_text(&me, "not-a-date").await.unwrap().unwrap();
        assert!(replies[0].text.contains("Invalid date format"));
        assert_eq!(
            h.machine.draft_of(&me).await.unwrap().unwrap().step,
            DraftStep::Schedule
        );

        let replies = h.machine.on_text(&me, "2000-01-01 08:00").await.unwrap().unwrap();
        assert!(replies[0].text.contains("in the past"));
        assert!(h.machine.draft_of(&me).await.unwrap().is_some());

        let replies = h.machine.on_text(&me, "2099-01-01 08:00").await.unwrap().unwrap();
        assert!(replies[0].text.starts_with("✅ Announcement scheduled for"));
        assert!(h.machine.draft_of(&me).await.unwrap().is_none());
        assert_eq!(h.store.count().await.unwrap(), 0);
        assert_eq!(h.services.scheduler.pending_count().await, 1);
        h.services.scheduler.shutdown();
    }

    struct BrokenAnnouncements;

    #[async_trait]
    impl AnnouncementStore for BrokenAnnouncements {
        async fn create(
            &self,
            _new: NewAnnouncement,
            _now: chrono::DateTime<Utc>,
        ) -> Result<Announcement> {
            Err(Error::Store("disk full".to_string()))
        }
        async fn get(&self, _id: AnnouncementId) -> Result<Option<Announcement>> {
            Ok(None)
        }
        async fn recent(&self, _skip: usize, _limit: usize) -> Result<Vec<Announcement>> {
            Ok(vec![])
        }
        async fn count(&self) -> Result<u64> {
            Ok(0)
        }
        async fn delete(&self, _id: AnnouncementId) -> Result<bool> {
            Ok(false)
        }
        async fn search(
            &self,
            _term: &str,
            _skip: usize,
            _limit: usize,
        ) -> Result<Vec<Announcement>> {
            Ok(vec![])
        }
        async fn count_search(&self, _term: &str) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn store_failure_surfaces_and_destroys_the_draft() {
        let h = harness_with(Some(Arc::new(BrokenAnnouncements))).await;
        fill(&h, "Midterm", "Midterms start next week in all halls.", "academic").await;

        let err = h
            .machine
            .on_selection(&admin(), ATTACHMENTS_DONE)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert!(h.machine.draft_of(&admin()).await.unwrap().is_none());
        assert!(h.fake.sent().is_empty());
    }
}
