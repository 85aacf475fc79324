use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ntb_core::{
    domain::{
        Announcement, AnnouncementId, Language, NewAnnouncement, Role, Subscriber, SubscriberId,
    },
    store::{AnnouncementStore, SubscriberPatch, SubscriberStore},
    Result,
};

use crate::database::Database;
use crate::error::StoreError;

/// Async store ports over one SQLite connection.
///
/// Queries run on the blocking pool; the connection is serialized by a mutex.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> std::result::Result<Self, StoreError> {
        Ok(Self::from_database(Database::open_at(path)?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> std::result::Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let joined = tokio::task::spawn_blocking(move || {
            let mut guard = db.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?;
        Ok(joined?)
    }
}

#[async_trait]
impl SubscriberStore for SqliteStore {
    async fn find(&self, id: &SubscriberId) -> Result<Option<Subscriber>> {
        let id = id.clone();
        self.with_db(move |db| db.find_subscriber(&id)).await
    }

    async fn upsert(
        &self,
        id: &SubscriberId,
        patch: SubscriberPatch,
        now: DateTime<Utc>,
    ) -> Result<Subscriber> {
        let id = id.clone();
        self.with_db(move |db| db.upsert_subscriber(&id, &patch, now))
            .await
    }

    async fn list_all(&self) -> Result<Vec<Subscriber>> {
        self.with_db(|db| db.list_subscribers()).await
    }

    async fn count_by_role(&self, role: Role) -> Result<u64> {
        self.with_db(move |db| db.count_subscribers_by_role(role))
            .await
    }

    async fn count_active_since(&self, since: DateTime<Utc>) -> Result<u64> {
        self.with_db(move |db| db.count_subscribers_active_since(since))
            .await
    }

    async fn group_by_language(&self) -> Result<Vec<(Language, u64)>> {
        self.with_db(|db| db.subscribers_by_language()).await
    }
}

#[async_trait]
impl AnnouncementStore for SqliteStore {
    async fn create(&self, new: NewAnnouncement, now: DateTime<Utc>) -> Result<Announcement> {
        self.with_db(move |db| db.insert_announcement(&new, now))
            .await
    }

    async fn get(&self, id: AnnouncementId) -> Result<Option<Announcement>> {
        self.with_db(move |db| db.get_announcement(id)).await
    }

    async fn recent(&self, skip: usize, limit: usize) -> Result<Vec<Announcement>> {
        self.with_db(move |db| db.recent_announcements(skip, limit))
            .await
    }

    async fn count(&self) -> Result<u64> {
        self.with_db(|db| db.count_announcements()).await
    }

    async fn delete(&self, id: AnnouncementId) -> Result<bool> {
        self.with_db(move |db| db.delete_announcement(id)).await
    }

    async fn search(&self, term: &str, skip: usize, limit: usize) -> Result<Vec<Announcement>> {
        let term = term.to_string();
        self.with_db(move |db| db.search_announcements(&term, skip, limit))
            .await
    }

    async fn count_search(&self, term: &str) -> Result<u64> {
        let term = term.to_string();
        self.with_db(move |db| db.count_search(&term)).await
    }
}
