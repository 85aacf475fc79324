//! Routing of inbound updates to commands and the conversation machine.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
    audit::AuditEvent,
    conversation::{ConversationMachine, Draft, CATEGORY_PREFIX},
    domain::{AnnouncementId, Language, Role, Subscriber, SubscriberId},
    formatting::{escape_html, format_datetime, render_listing_entry},
    messaging::types::{
        Command, FileUpload, IncomingUpdate, InlineButton, InlineKeyboard, Reply, Selection,
        Sender, TextMessage,
    },
    services::Services,
    session::{MemorySessionStore, SessionStore},
    Error, Result,
};

const LANGUAGE_PREFIX: &str = "lang:";
const PAGE_PREFIX: &str = "page:";

/// Pending `/addadmin` or `/removeadmin` waiting for an id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminAction {
    Add,
    Remove,
}

/// `/search` issued without a term; the next text is the term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSearch;

/// Which listing an initiator is paging through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    /// `None` for `/announcements`, `Some(term)` for search results.
    pub query: Option<String>,
    pub page: usize,
}

/// Backing stores for every kind of per-initiator state.
#[derive(Clone)]
pub struct SessionStores {
    pub drafts: Arc<dyn SessionStore<Draft>>,
    pub admin_actions: Arc<dyn SessionStore<AdminAction>>,
    pub searches: Arc<dyn SessionStore<PendingSearch>>,
    pub pages: Arc<dyn SessionStore<PageCursor>>,
}

impl SessionStores {
    pub fn in_memory() -> Self {
        Self {
            drafts: Arc::new(MemorySessionStore::new()),
            admin_actions: Arc::new(MemorySessionStore::new()),
            searches: Arc::new(MemorySessionStore::new()),
            pages: Arc::new(MemorySessionStore::new()),
        }
    }
}

pub struct EventDispatcher {
    services: Services,
    conversation: ConversationMachine,
    sessions: SessionStores,
}

impl EventDispatcher {
    pub fn new(services: Services) -> Self {
        Self::with_sessions(services, SessionStores::in_memory())
    }

    pub fn with_sessions(services: Services, sessions: SessionStores) -> Self {
        let conversation = ConversationMachine::new(sessions.drafts.clone(), services.clone());
        Self {
            services,
            conversation,
            sessions,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Route one update. Every update counts as an interaction of its sender.
    pub async fn handle(&self, update: IncomingUpdate) -> Result<Vec<Reply>> {
        let sender = update.sender();
        let display_name = sender
            .display_name
            .as_deref()
            .or(sender.username.as_deref());
        let me = self
            .services
            .directory
            .upsert_on_interaction(&sender.id, display_name)
            .await?;

        match &update {
            IncomingUpdate::Command(cmd) => self.on_command(&me, cmd).await,
            IncomingUpdate::Text(msg) => self.on_text(&me, msg).await,
            IncomingUpdate::Selection(sel) => self.on_selection(&me, sel).await,
            IncomingUpdate::File(file) => self.on_file(&me, file).await,
        }
    }

    /// [`EventDispatcher::handle`] with failures turned into a localized
    /// generic reply. Nothing escapes; errors are logged and audited.
    pub async fn handle_or_report(&self, update: IncomingUpdate) -> Vec<Reply> {
        let sender = update.sender().clone();
        let context = match &update {
            IncomingUpdate::Command(c) => format!("command /{}", c.name),
            IncomingUpdate::Text(_) => "text".to_string(),
            IncomingUpdate::Selection(s) => format!("selection {}", s.data),
            IncomingUpdate::File(f) => format!("file {}", f.kind.as_str()),
        };

        match self.handle(update).await {
            Ok(replies) => replies,
            Err(e) => {
                error!(sender = %sender.id, context = %context, error = %e, "update handling failed");
                self.services
                    .audit
                    .record(AuditEvent::error(&sender.id, &e.to_string(), Some(&context)));
                let lang = self.language_of(&sender).await;
                vec![Reply::text(self.services.i18n.text(lang, "generic_error"))]
            }
        }
    }

    async fn language_of(&self, sender: &Sender) -> Language {
        match self.services.directory.language_of(&sender.id).await {
            Ok(Some(lang)) => lang,
            _ => self.services.i18n.fallback(),
        }
    }

    fn text(&self, lang: Language, key: &str) -> Reply {
        Reply::text(self.services.i18n.text(lang, key))
    }

    fn text_with(&self, lang: Language, key: &str, vars: &[(&str, &str)]) -> Reply {
        Reply::text(self.services.i18n.text_with(lang, key, vars))
    }

    // ============== Commands ==============

    async fn on_command(&self, me: &Subscriber, cmd: &Command) -> Result<Vec<Reply>> {
        let lang = me.language;
        debug!(sender = %me.id, command = %cmd.name, "command");

        // A new command abandons any half-finished single-exchange prompt.
        self.sessions.admin_actions.remove(&me.id).await?;
        self.sessions.searches.remove(&me.id).await?;

        match cmd.name.as_str() {
            "start" => Ok(vec![self.text(lang, "welcome")]),
            "help" => self.help(me).await,
            "myid" => {
                let no_username = self.services.i18n.text(lang, "no_username");
                let username = cmd
                    .sender
                    .username
                    .as_deref()
                    .map(|u| format!("@{u}"))
                    .unwrap_or(no_username);
                Ok(vec![self.text_with(
                    lang,
                    "myid",
                    &[("id", me.id.as_str()), ("username", &username)],
                )])
            }
            "language" => Ok(vec![Reply::with_keyboard(
                self.services.i18n.text(lang, "language_prompt"),
                language_keyboard(),
            )]),
            "announce" => self.conversation.begin(&me.id, lang).await,
            "announcements" | "getannouncements" => {
                let cursor = PageCursor {
                    query: None,
                    page: 0,
                };
                self.show_page(me, cursor).await
            }
            "search" => {
                if cmd.args.is_empty() {
                    self.sessions.searches.set(&me.id, PendingSearch).await?;
                    return Ok(vec![self.text(lang, "search_prompt")]);
                }
                self.search(me, &cmd.args).await
            }
            "addadmin" => self.admin_command(me, AdminAction::Add, &cmd.args).await,
            "removeadmin" => self.admin_command(me, AdminAction::Remove, &cmd.args).await,
            "delete" => self.delete(me, &cmd.args).await,
            "stats" => self.stats(me).await,
            "scheduled" => self.scheduled(me).await,
            _ => Ok(vec![self.text(lang, "unknown_command")]),
        }
    }

    async fn help(&self, me: &Subscriber) -> Result<Vec<Reply>> {
        let mut text = self.services.i18n.text(me.language, "help");
        if self.services.admin.is_admin(&me.id).await? {
            text.push_str(&self.services.i18n.text(me.language, "help_admin"));
        }
        Ok(vec![Reply::text(text)])
    }

    async fn require_admin(&self, me: &Subscriber) -> Result<Option<Vec<Reply>>> {
        match self.services.admin.ensure_admin(&me.id).await {
            Ok(()) => Ok(None),
            Err(Error::Unauthorized(_)) => {
                info!(sender = %me.id, "admin command refused");
                Ok(Some(vec![self.text(me.language, "not_authorized")]))
            }
            Err(e) => Err(e),
        }
    }

    async fn admin_command(
        &self,
        me: &Subscriber,
        action: AdminAction,
        args: &str,
    ) -> Result<Vec<Reply>> {
        if let Some(denied) = self.require_admin(me).await? {
            return Ok(denied);
        }
        if args.is_empty() {
            self.sessions.admin_actions.set(&me.id, action).await?;
            let key = match action {
                AdminAction::Add => "addadmin_prompt",
                AdminAction::Remove => "removeadmin_prompt",
            };
            return Ok(vec![self.text(me.language, key)]);
        }
        self.apply_admin_action(me, action, args).await
    }

    async fn apply_admin_action(
        &self,
        me: &Subscriber,
        action: AdminAction,
        raw_id: &str,
    ) -> Result<Vec<Reply>> {
        let lang = me.language;
        let Some(target) = parse_user_id(raw_id) else {
            return Ok(vec![self.text(lang, "invalid_user_id")]);
        };
        let admin = &self.services.admin;

        match action {
            AdminAction::Add => {
                admin.add_admin(&target).await?;
                self.services
                    .audit
                    .record(AuditEvent::admin_added(&me.id, &target));
                Ok(vec![self.text_with(lang, "admin_added", &[("id", target.as_str())])])
            }
            AdminAction::Remove => {
                if target == me.id {
                    return Ok(vec![self.text(lang, "cannot_demote_self")]);
                }
                if admin.is_configured_admin(&target) {
                    return Ok(vec![self.text_with(
                        lang,
                        "cannot_demote_configured",
                        &[("id", target.as_str())],
                    )]);
                }
                admin.remove_admin(&target).await?;
                self.services
                    .audit
                    .record(AuditEvent::admin_removed(&me.id, &target));
                Ok(vec![self.text_with(lang, "admin_removed", &[("id", target.as_str())])])
            }
        }
    }

    async fn delete(&self, me: &Subscriber, args: &str) -> Result<Vec<Reply>> {
        if let Some(denied) = self.require_admin(me).await? {
            return Ok(denied);
        }
        let lang = me.language;
        let Ok(raw) = args.trim().parse::<i64>() else {
            return Ok(vec![self.text(lang, "delete_usage")]);
        };
        let id = AnnouncementId(raw);
        let id_text = id.to_string();

        if !self.services.announcements.delete(id).await? {
            return Ok(vec![self.text_with(lang, "delete_not_found", &[("id", &id_text)])]);
        }
        info!(sender = %me.id, announcement = %id, "announcement deleted");
        self.services.audit.record(AuditEvent::deleted(&me.id, raw));
        Ok(vec![self.text_with(lang, "deleted", &[("id", &id_text)])])
    }

    async fn stats(&self, me: &Subscriber) -> Result<Vec<Reply>> {
        if let Some(denied) = self.require_admin(me).await? {
            return Ok(denied);
        }
        let lang = me.language;
        let dir = &self.services.directory;
        let window = self.services.cfg.active_window;

        let subscribers = dir.count_by_role(Role::Subscriber).await?;
        let admins = dir.count_by_role(Role::Admin).await?;
        let since = Utc::now()
            - ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::hours(24));
        let active = dir.count_active_since(since).await?;
        let announcements = self.services.announcements.count().await?;
        let scheduled = self.services.scheduler.pending_count().await;
        let languages = dir
            .group_by_language()
            .await?
            .into_iter()
            .map(|(l, n)| format!("  {}: {n}", l.native_name()))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(vec![self.text_with(
            lang,
            "stats",
            &[
                ("total", &(subscribers + admins).to_string()),
                ("admins", &admins.to_string()),
                ("hours", &(window.as_secs() / 3600).to_string()),
                ("active", &active.to_string()),
                ("announcements", &announcements.to_string()),
                ("scheduled", &scheduled.to_string()),
                ("languages", &languages),
            ],
        )])
    }

    async fn scheduled(&self, me: &Subscriber) -> Result<Vec<Reply>> {
        if let Some(denied) = self.require_admin(me).await? {
            return Ok(denied);
        }
        let lang = me.language;
        let pending = self.services.scheduler.pending().await;
        if pending.is_empty() {
            return Ok(vec![self.text(lang, "scheduled_none")]);
        }

        let mut out = self.services.i18n.text(lang, "scheduled_header");
        for p in pending {
            let a = &p.job.announcement;
            out.push_str(&format!(
                "\n• {} · {} {} (#{})",
                format_datetime(p.job.due_at, lang),
                a.category.emoji(),
                escape_html(&a.title),
                a.category.tag()
            ));
        }
        Ok(vec![Reply::text(out)])
    }

    // ============== Listings ==============

    async fn search(&self, me: &Subscriber, term: &str) -> Result<Vec<Reply>> {
        let cursor = PageCursor {
            query: Some(term.trim().to_string()),
            page: 0,
        };
        self.show_page(me, cursor).await
    }

    async fn show_page(&self, me: &Subscriber, cursor: PageCursor) -> Result<Vec<Reply>> {
        let lang = me.language;
        let i18n = &self.services.i18n;
        let store = &self.services.announcements;
        let size = self.services.cfg.recent_page_size.max(1);

        let total: u64 = match &cursor.query {
            None => store.count().await?,
            Some(term) => store.count_search(term).await?,
        };
        let total = total as usize;
        if total == 0 {
            self.sessions.pages.remove(&me.id).await?;
            return Ok(vec![match &cursor.query {
                None => self.text(lang, "no_announcements"),
                Some(term) => self.text_with(
                    lang,
                    "search_no_results",
                    &[("term", &escape_html(term))],
                ),
            }]);
        }

        let pages = total.div_ceil(size);
        let page = cursor.page.min(pages - 1);
        let items = match &cursor.query {
            None => store.recent(page * size, size).await?,
            Some(term) => store.search(term, page * size, size).await?,
        };

        let header = match &cursor.query {
            None => i18n.text(lang, "recent_header"),
            Some(term) => i18n.text_with(lang, "search_header", &[("term", &escape_html(term))]),
        };
        let entries = items
            .iter()
            .map(|a| render_listing_entry(i18n, lang, a))
            .collect::<Vec<_>>()
            .join("\n\n");
        let footer = i18n.text_with(
            lang,
            "page_footer",
            &[
                ("page", &(page + 1).to_string()),
                ("pages", &pages.to_string()),
            ],
        );
        let text = format!("{header}\n\n{entries}\n\n{footer}");

        let mut nav = Vec::new();
        if page > 0 {
            nav.push(InlineButton::new(
                i18n.text(lang, "button_prev"),
                format!("{PAGE_PREFIX}{}", page - 1),
            ));
        }
        if page + 1 < pages {
            nav.push(InlineButton::new(
                i18n.text(lang, "button_next"),
                format!("{PAGE_PREFIX}{}", page + 1),
            ));
        }

        self.sessions
            .pages
            .set(
                &me.id,
                PageCursor {
                    query: cursor.query,
                    page,
                },
            )
            .await?;

        if nav.is_empty() {
            return Ok(vec![Reply::text(text)]);
        }
        Ok(vec![Reply::with_keyboard(text, InlineKeyboard::new(vec![nav]))])
    }

    // ============== Free text, selections, files ==============

    async fn on_text(&self, me: &Subscriber, msg: &TextMessage) -> Result<Vec<Reply>> {
        if let Some(action) = self.sessions.admin_actions.remove(&me.id).await? {
            // Re-check: the sender may have been demoted since the prompt.
            if let Some(denied) = self.require_admin(me).await? {
                return Ok(denied);
            }
            return self.apply_admin_action(me, action, &msg.text).await;
        }

        if self.sessions.searches.remove(&me.id).await?.is_some() {
            return self.search(me, &msg.text).await;
        }

        if let Some(replies) = self.conversation.on_text(&me.id, &msg.text).await? {
            return Ok(replies);
        }

        debug!(sender = %me.id, "ignoring free text outside any flow");
        Ok(Vec::new())
    }

    async fn on_selection(&self, me: &Subscriber, sel: &Selection) -> Result<Vec<Reply>> {
        let data = sel.data.as_str();

        if data.starts_with(CATEGORY_PREFIX) || data.starts_with("att:") {
            return Ok(self
                .conversation
                .on_selection(&me.id, data)
                .await?
                .unwrap_or_default());
        }

        if let Some(code) = data.strip_prefix(LANGUAGE_PREFIX) {
            let Ok(lang) = code.parse::<Language>() else {
                return Ok(Vec::new());
            };
            self.services.directory.set_language(&me.id, lang).await?;
            return Ok(vec![self.text(lang, "language_changed")]);
        }

        if let Some(raw) = data.strip_prefix(PAGE_PREFIX) {
            let (Ok(page), Some(cursor)) = (
                raw.parse::<usize>(),
                self.sessions.pages.get(&me.id).await?,
            ) else {
                return Ok(Vec::new());
            };
            return self
                .show_page(
                    me,
                    PageCursor {
                        query: cursor.query,
                        page,
                    },
                )
                .await;
        }

        debug!(sender = %me.id, data, "unrecognized selection");
        Ok(Vec::new())
    }

    async fn on_file(&self, me: &Subscriber, file: &FileUpload) -> Result<Vec<Reply>> {
        Ok(self
            .conversation
            .on_file(&me.id, file.kind, &file.file_ref)
            .await?
            .unwrap_or_default())
    }
}

fn language_keyboard() -> InlineKeyboard {
    let buttons = Language::ALL
        .iter()
        .map(|l| InlineButton::new(l.native_name(), format!("{LANGUAGE_PREFIX}{}", l.code())))
        .collect();
    InlineKeyboard::grid(buttons, 3)
}

/// Telegram ids are (possibly negative) integers.
fn parse_user_id(raw: &str) -> Option<SubscriberId> {
    raw.trim().parse::<i64>().ok().map(SubscriberId::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Category, NewAnnouncement},
        store::{AnnouncementStore, MemoryStore},
        testing::{test_config, FakeMessenger},
    };

    struct Harness {
        dispatcher: EventDispatcher,
        store: Arc<MemoryStore>,
        fake: Arc<FakeMessenger>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let fake = Arc::new(FakeMessenger::default());
        let services = Services::new(
            Arc::new(test_config()),
            store.clone(),
            store.clone(),
            fake.clone(),
        );
        Harness {
            dispatcher: EventDispatcher::new(services),
            store,
            fake,
        }
    }

    fn command(from: &str, text: &str) -> IncomingUpdate {
        let mut sender = Sender::new(from);
        sender.username = Some(format!("user{from}"));
        IncomingUpdate::Command(Command::parse(sender, text).unwrap())
    }

    fn text(from: &str, text: &str) -> IncomingUpdate {
        IncomingUpdate::Text(TextMessage {
            sender: Sender::new(from),
            text: text.to_string(),
        })
    }

    fn select(from: &str, data: &str) -> IncomingUpdate {
        IncomingUpdate::Selection(Selection {
            sender: Sender::new(from),
            data: data.to_string(),
        })
    }

    async fn send(h: &Harness, update: IncomingUpdate) -> Vec<Reply> {
        h.dispatcher.handle(update).await.unwrap()
    }

    async fn seed(h: &Harness, n: usize) {
        for i in 0..n {
            h.store
                .create(
                    NewAnnouncement {
                        title: format!("Notice {i}"),
                        body: format!("Body number {i} with enough text."),
                        category: Category::General,
                        attachments: vec![],
                        created_by: SubscriberId::new("1"),
                    },
                    Utc::now() + ChronoDuration::seconds(i as i64),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn start_registers_the_sender() {
        let h = harness();
        let replies = send(&h, command("77", "/start")).await;
        assert!(replies[0].text.contains("Welcome"));

        let me = h
            .dispatcher
            .services()
            .directory
            .find(&SubscriberId::new("77"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(me.role, Role::Subscriber);
        assert_eq!(me.display_name.as_deref(), Some("user77"));
    }

    #[tokio::test]
    async fn help_shows_admin_section_only_to_admins() {
        let h = harness();
        let student = send(&h, command("2", "/help")).await;
        assert!(!student[0].text.contains("/addadmin"));
        let admin = send(&h, command("1", "/help")).await;
        assert!(admin[0].text.contains("/addadmin"));
    }

    #[tokio::test]
    async fn myid_reports_id_and_username() {
        let h = harness();
        let replies = send(&h, command("42", "/myid")).await;
        assert!(replies[0].text.contains("Telegram ID: 42"));
        assert!(replies[0].text.contains("@user42"));
    }

    #[tokio::test]
    async fn language_selection_is_persisted_and_used() {
        let h = harness();
        let replies = send(&h, command("5", "/language")).await;
        assert_eq!(replies[0].keyboard.as_ref().unwrap().buttons().count(), 3);

        let replies = send(&h, select("5", "lang:fr")).await;
        assert!(replies[0].text.contains("Langue définie"));
        let replies = send(&h, command("5", "/nope")).await;
        assert!(replies[0].text.contains("Commande inconnue"));
    }

    #[tokio::test]
    async fn full_announce_flow_through_the_dispatcher() {
        let h = harness();
        send(&h, command("2", "/start")).await;
        send(&h, command("1", "/announce")).await;
        send(&h, text("1", "Midterm")).await;
        send(&h, text("1", "Midterms start next week in all halls.")).await;
        send(&h, select("1", "cat:academic")).await;
        let replies = send(&h, select("1", "att:done")).await;

        assert!(replies[0].text.contains("sent successfully"));
        assert_eq!(h.store.count().await.unwrap(), 1);
        assert_eq!(h.fake.texts_to(&SubscriberId::new("2")).len(), 1);
        assert_eq!(h.fake.texts_to(&SubscriberId::new("1")).len(), 1);
    }

    #[tokio::test]
    async fn stray_text_and_stale_buttons_are_ignored() {
        let h = harness();
        assert!(send(&h, text("3", "hello?")).await.is_empty());
        assert!(send(&h, select("3", "att:done")).await.is_empty());
        assert!(send(&h, select("3", "page:1")).await.is_empty());
        assert!(send(&h, select("3", "bogus")).await.is_empty());
    }

    #[tokio::test]
    async fn listing_is_paginated_newest_first() {
        let h = harness();
        seed(&h, 3).await;

        let first = send(&h, command("9", "/announcements")).await;
        assert!(first[0].text.contains("Notice 2"));
        assert!(first[0].text.contains("Notice 1"));
        assert!(!first[0].text.contains("Notice 0"));
        assert!(first[0].text.contains("Page 1/2"));
        let kb = first[0].keyboard.as_ref().unwrap();
        let data: Vec<_> = kb.buttons().map(|b| b.callback_data.as_str()).collect();
        assert_eq!(data, vec!["page:1"]);

        let second = send(&h, select("9", "page:1")).await;
        assert!(second[0].text.contains("Notice 0"));
        assert!(second[0].text.contains("Page 2/2"));

        let legacy = send(&h, command("9", "/getannouncements")).await;
        assert!(legacy[0].text.contains("Page 1/2"));
    }

    #[tokio::test]
    async fn empty_listing_says_so() {
        let h = harness();
        let replies = send(&h, command("9", "/announcements")).await;
        assert!(replies[0].text.contains("No announcements"));
        assert!(replies[0].keyboard.is_none());
    }

    #[tokio::test]
    async fn search_with_and_without_a_term() {
        let h = harness();
        seed(&h, 2).await;

        let replies = send(&h, command("9", "/search notice 1")).await;
        assert!(replies[0].text.contains("Notice 1"));
        assert!(!replies[0].text.contains("Notice 0"));

        let replies = send(&h, command("9", "/search")).await;
        assert!(replies[0].text.contains("Send the text to search"));
        let replies = send(&h, text("9", "NUMBER 0")).await;
        assert!(replies[0].text.contains("Notice 0"));

        let replies = send(&h, command("9", "/search zzz")).await;
        assert!(replies[0].text.contains("No announcements match"));
    }

    #[tokio::test]
    async fn admin_commands_are_refused_for_subscribers() {
        let h = harness();
        for cmd in ["/addadmin 5", "/removeadmin 5", "/delete 1", "/stats", "/scheduled"] {
            let replies = send(&h, command("2", cmd)).await;
            assert!(replies[0].text.contains("not authorized"), "{cmd}");
        }
    }

    #[tokio::test]
    async fn add_and_remove_admin_with_prompted_id() {
        let h = harness();
        let policy = h.dispatcher.services().admin.clone();

        let replies = send(&h, command("1", "/addadmin")).await;
        assert!(replies[0].text.contains("Telegram ID"));
        let replies = send(&h, text("1", "abc")).await;
        assert!(replies[0].text.contains("does not look like"));
        // the prompt was consumed by the bad answer
        assert!(send(&h, text("1", "55")).await.is_empty());

        send(&h, command("1", "/addadmin 55")).await;
        assert!(policy.is_admin(&SubscriberId::new("55")).await.unwrap());

        send(&h, command("1", "/removeadmin")).await;
        let replies = send(&h, text("1", "55")).await;
        assert!(replies[0].text.contains("no longer an admin"));
        assert!(!policy.is_admin(&SubscriberId::new("55")).await.unwrap());
    }

    #[tokio::test]
    async fn admin_help_and_delete_usage_are_valid_html() {
        let h = harness();
        let help = send(&h, command("1", "/help")).await;
        let usage = send(&h, command("1", "/delete x")).await;

        assert!(help[0].text.contains("/delete &lt;id&gt;"));
        for reply in help.iter().chain(usage.iter()) {
            assert_eq!(crate::testing::telegram_html_error(&reply.text), None);
        }
    }

    #[tokio::test]
    async fn admins_cannot_demote_themselves_or_configured_admins() {
        let h = harness();
        send(&h, command("1", "/addadmin 8")).await;

        let replies = send(&h, command("8", "/removeadmin 8")).await;
        assert!(replies[0].text.contains("cannot remove your own"));
        let replies = send(&h, command("8", "/removeadmin 1")).await;
        assert!(replies[0].text.contains("configured admin"));
        assert!(h
            .dispatcher
            .services()
            .admin
            .is_admin(&SubscriberId::new("8"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn delete_then_delete_again_reports_not_found() {
        let h = harness();
        seed(&h, 1).await;
        let id = h.store.recent(0, 1).await.unwrap()[0].id;

        let replies = send(&h, command("1", &format!("/delete {id}"))).await;
        assert!(replies[0].text.contains("deleted"));
        assert!(h.store.get(id).await.unwrap().is_none());
        assert!(h.store.recent(0, 10).await.unwrap().is_empty());

        let replies = send(&h, command("1", &format!("/delete {id}"))).await;
        assert!(replies[0].text.contains("not found"));

        let replies = send(&h, command("1", "/delete x")).await;
        assert!(replies[0].text.contains("Usage"));
    }

    #[tokio::test]
    async fn stats_counts_roles_languages_and_announcements() {
        let h = harness();
        send(&h, command("2", "/start")).await;
        send(&h, select("2", "lang:ar")).await;
        seed(&h, 2).await;

        let replies = send(&h, command("1", "/stats")).await;
        let t = &replies[0].text;
        assert!(t.contains("Subscribers: 2"));
        assert!(t.contains("Admins: 1"));
        assert!(t.contains("Announcements: 2"));
        assert!(t.contains("Scheduled: 0"));
        assert!(t.contains("العربية 🇸🇦: 1"));
    }

    #[tokio::test]
    async fn scheduled_lists_pending_jobs() {
        let h = harness();
        let replies = send(&h, command("1", "/scheduled")).await;
        assert!(replies[0].text.contains("No scheduled"));

        send(&h, command("1", "/announce")).await;
        send(&h, text("1", "Fair")).await;
        send(&h, text("1", "Career fair on Monday in the hall.")).await;
        send(&h, select("1", "cat:events")).await;
        send(&h, select("1", "att:schedule")).await;
        send(&h, text("1", "2099-06-01 09:00")).await;

        let replies = send(&h, command("1", "/scheduled")).await;
        assert!(replies[0].text.contains("Fair"));
        assert!(replies[0].text.contains("#events"));
        h.dispatcher.services().scheduler.shutdown();
    }

    #[tokio::test]
    async fn pending_admin_prompt_takes_precedence_over_a_draft() {
        let h = harness();
        send(&h, command("1", "/announce")).await;
        send(&h, command("1", "/addadmin")).await;
        let replies = send(&h, text("1", "66")).await;
        assert!(replies[0].text.contains("66 is now an admin"));

        // the draft is still waiting for its title
        let replies = send(&h, text("1", "Title here")).await;
        assert!(replies[0].text.contains("announcement message"));
    }
}
