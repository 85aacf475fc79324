//! Storage ports for subscribers and announcements, plus an in-process implementation.
//!
//! The SQLite adapter lives in `ntb-sqlite`; [`MemoryStore`] backs tests and
//! `STORE_BACKEND=memory` deployments.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    domain::{
        Announcement, AnnouncementId, Language, NewAnnouncement, Role, Subscriber, SubscriberId,
    },
    Result,
};

/// Partial update applied by [`SubscriberStore::upsert`].
///
/// `None` fields are left untouched on existing records and take their default
/// on newly created ones. `touch` refreshes `last_active_at`.
#[derive(Clone, Debug, Default)]
pub struct SubscriberPatch {
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub language: Option<Language>,
    pub touch: bool,
}

impl SubscriberPatch {
    pub fn touch() -> Self {
        Self {
            touch: true,
            ..Self::default()
        }
    }

    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Self::default()
        }
    }

    pub fn language(language: Language) -> Self {
        Self {
            language: Some(language),
            ..Self::default()
        }
    }

    /// Apply the patch to an existing record.
    pub fn apply(&self, sub: &mut Subscriber, now: DateTime<Utc>) {
        if let Some(name) = &self.display_name {
            sub.display_name = Some(name.clone());
        }
        if let Some(role) = self.role {
            sub.role = role;
        }
        if let Some(language) = self.language {
            sub.language = language;
        }
        if self.touch {
            sub.last_active_at = now;
        }
    }

    /// Build a fresh record from the patch.
    pub fn create(&self, id: SubscriberId, now: DateTime<Utc>) -> Subscriber {
        Subscriber {
            id,
            display_name: self.display_name.clone(),
            role: self.role.unwrap_or_default(),
            language: self.language.unwrap_or_default(),
            last_active_at: now,
            created_at: now,
        }
    }
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn find(&self, id: &SubscriberId) -> Result<Option<Subscriber>>;

    /// Create-or-update by id. Never creates duplicates for the same id.
    async fn upsert(
        &self,
        id: &SubscriberId,
        patch: SubscriberPatch,
        now: DateTime<Utc>,
    ) -> Result<Subscriber>;

    async fn list_all(&self) -> Result<Vec<Subscriber>>;

    async fn count_by_role(&self, role: Role) -> Result<u64>;

    async fn count_active_since(&self, since: DateTime<Utc>) -> Result<u64>;

    /// Subscriber counts per language, ordered by language.
    async fn group_by_language(&self) -> Result<Vec<(Language, u64)>>;
}

#[async_trait]
pub trait AnnouncementStore: Send + Sync {
    async fn create(&self, new: NewAnnouncement, now: DateTime<Utc>) -> Result<Announcement>;

    async fn get(&self, id: AnnouncementId) -> Result<Option<Announcement>>;

    /// Newest first (`created_at` desc, then id desc).
    async fn recent(&self, skip: usize, limit: usize) -> Result<Vec<Announcement>>;

    async fn count(&self) -> Result<u64>;

    /// Returns `false` when nothing was deleted.
    async fn delete(&self, id: AnnouncementId) -> Result<bool>;

    /// Case-insensitive substring match over title and body, newest first.
    async fn search(&self, term: &str, skip: usize, limit: usize) -> Result<Vec<Announcement>>;

    async fn count_search(&self, term: &str) -> Result<u64>;
}

#[derive(Default)]
struct MemoryState {
    subscribers: HashMap<SubscriberId, Subscriber>,
    announcements: BTreeMap<AnnouncementId, Announcement>,
    next_id: i64,
}

impl MemoryState {
    fn newest_first(&self) -> Vec<&Announcement> {
        let mut all: Vec<&Announcement> = self.announcements.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        all
    }
}

/// In-process store for both ports. Data does not survive a restart.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_term(a: &Announcement, needle: &str) -> bool {
    a.title.to_lowercase().contains(needle) || a.body.to_lowercase().contains(needle)
}

#[async_trait]
impl SubscriberStore for MemoryStore {
    async fn find(&self, id: &SubscriberId) -> Result<Option<Subscriber>> {
        Ok(self.state.lock().await.subscribers.get(id).cloned())
    }

    async fn upsert(
        &self,
        id: &SubscriberId,
        patch: SubscriberPatch,
        now: DateTime<Utc>,
    ) -> Result<Subscriber> {
        let mut st = self.state.lock().await;
        let sub = st
            .subscribers
            .entry(id.clone())
            .and_modify(|s| patch.apply(s, now))
            .or_insert_with(|| patch.create(id.clone(), now));
        Ok(sub.clone())
    }

    async fn list_all(&self) -> Result<Vec<Subscriber>> {
        let st = self.state.lock().await;
        let mut all: Vec<Subscriber> = st.subscribers.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn count_by_role(&self, role: Role) -> Result<u64> {
        let st = self.state.lock().await;
        Ok(st.subscribers.values().filter(|s| s.role == role).count() as u64)
    }

    async fn count_active_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let st = self.state.lock().await;
        Ok(st
            .subscribers
            .values()
            .filter(|s| s.last_active_at >= since)
            .count() as u64)
    }

    async fn group_by_language(&self) -> Result<Vec<(Language, u64)>> {
        let st = self.state.lock().await;
        let mut counts: BTreeMap<Language, u64> = BTreeMap::new();
        for s in st.subscribers.values() {
            *counts.entry(s.language).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

#[async_trait]
impl AnnouncementStore for MemoryStore {
    async fn create(&self, new: NewAnnouncement, now: DateTime<Utc>) -> Result<Announcement> {
        let mut st = self.state.lock().await;
        st.next_id += 1;
        let id = AnnouncementId(st.next_id);
        let announcement = Announcement {
            id,
            title: new.title,
            body: new.body,
            category: new.category,
            attachments: new.attachments,
            created_by: new.created_by,
            created_at: now,
        };
        st.announcements.insert(id, announcement.clone());
        Ok(announcement)
    }

    async fn get(&self, id: AnnouncementId) -> Result<Option<Announcement>> {
        Ok(self.state.lock().await.announcements.get(&id).cloned())
    }

    async fn recent(&self, skip: usize, limit: usize) -> Result<Vec<Announcement>> {
        let st = self.state.lock().await;
        Ok(st
            .newest_first()
            .into_iter()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.state.lock().await.announcements.len() as u64)
    }

    async fn delete(&self, id: AnnouncementId) -> Result<bool> {
        Ok(self.state.lock().await.announcements.remove(&id).is_some())
    }

    async fn search(&self, term: &str, skip: usize, limit: usize) -> Result<Vec<Announcement>> {
        let needle = term.to_lowercase();
        let st = self.state.lock().await;
        Ok(st
            .newest_first()
            .into_iter()
            .filter(|a| matches_term(a, &needle))
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_search(&self, term: &str) -> Result<u64> {
        let needle = term.to_lowercase();
        let st = self.state.lock().await;
        Ok(st
            .announcements
            .values()
            .filter(|a| matches_term(a, &needle))
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use chrono::Duration;

    fn new_announcement(title: &str, body: &str) -> NewAnnouncement {
        NewAnnouncement {
            title: title.to_string(),
            body: body.to_string(),
            category: Category::General,
            attachments: vec![],
            created_by: SubscriberId::new("1"),
        }
    }

    #[tokio::test]
    async fn upsert_creates_once_and_applies_patches() {
        let store = MemoryStore::new();
        let id = SubscriberId::new("10");
        let t0 = Utc::now();

        let s = store.upsert(&id, SubscriberPatch::touch(), t0).await.unwrap();
        assert_eq!(s.role, Role::Subscriber);
        assert_eq!(s.language, Language::En);

        let later = t0 + Duration::minutes(5);
        let s = store
            .upsert(&id, SubscriberPatch::language(Language::Ar), later)
            .await
            .unwrap();
        assert_eq!(s.language, Language::Ar);
        assert_eq!(s.last_active_at, t0, "language change alone is not activity");
        assert_eq!(s.created_at, t0);

        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn counts_and_grouping() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .upsert(&SubscriberId::new("1"), SubscriberPatch::role(Role::Admin), now)
            .await
            .unwrap();
        store
            .upsert(
                &SubscriberId::new("2"),
                SubscriberPatch::language(Language::Fr),
                now - Duration::days(3),
            )
            .await
            .unwrap();
        store
            .upsert(&SubscriberId::new("3"), SubscriberPatch::touch(), now)
            .await
            .unwrap();

        assert_eq!(store.count_by_role(Role::Admin).await.unwrap(), 1);
        assert_eq!(store.count_by_role(Role::Subscriber).await.unwrap(), 2);
        assert_eq!(
            store
                .count_active_since(now - Duration::hours(1))
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            store.group_by_language().await.unwrap(),
            vec![(Language::En, 2), (Language::Fr, 1)]
        );
    }

    #[tokio::test]
    async fn recent_is_newest_first_with_paging() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        for i in 0..4 {
            store
                .create(
                    new_announcement(&format!("Title {i}"), "Some body text here"),
                    t0 + Duration::seconds(i),
                )
                .await
                .unwrap();
        }
        let page = store.recent(0, 2).await.unwrap();
        assert_eq!(page[0].title, "Title 3");
        assert_eq!(page[1].title, "Title 2");
        let page = store.recent(2, 2).await.unwrap();
        assert_eq!(page[0].title, "Title 1");
        assert!(store.recent(4, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_then_repeat_delete_reports_missing() {
        let store = MemoryStore::new();
        let a = store
            .create(new_announcement("Midterm", "Midterms start next week."), Utc::now())
            .await
            .unwrap();

        assert!(store.delete(a.id).await.unwrap());
        assert!(store.recent(0, 10).await.unwrap().is_empty());
        assert!(!store.delete(a.id).await.unwrap());
    }

    #[tokio::test]
    async fn search_is_case_insensitive_over_title_and_body() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .create(new_announcement("Football final", "Join us at the stadium."), now)
            .await
            .unwrap();
        store
            .create(new_announcement("Library hours", "The LIBRARY opens at 8."), now)
            .await
            .unwrap();

        assert_eq!(store.count_search("library").await.unwrap(), 1);
        assert_eq!(store.search("STADIUM", 0, 10).await.unwrap().len(), 1);
        assert_eq!(store.count_search("nothing").await.unwrap(), 0);
    }
}
