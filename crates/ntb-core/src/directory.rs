use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    domain::{Language, Role, Subscriber, SubscriberId},
    store::{SubscriberPatch, SubscriberStore},
    Result,
};

/// Subscriber directory: identity, role, language and activity records.
#[derive(Clone)]
pub struct SubscriberDirectory {
    store: Arc<dyn SubscriberStore>,
}

impl SubscriberDirectory {
    pub fn new(store: Arc<dyn SubscriberStore>) -> Self {
        Self { store }
    }

    /// Create-or-touch. Refreshes `last_active_at` and the display name when known.
    pub async fn upsert_on_interaction(
        &self,
        id: &SubscriberId,
        display_name: Option<&str>,
    ) -> Result<Subscriber> {
        let patch = SubscriberPatch {
            display_name: display_name.map(|s| s.to_string()),
            touch: true,
            ..SubscriberPatch::default()
        };
        self.store.upsert(id, patch, Utc::now()).await
    }

    pub async fn set_language(&self, id: &SubscriberId, language: Language) -> Result<Subscriber> {
        self.store
            .upsert(id, SubscriberPatch::language(language), Utc::now())
            .await
    }

    /// Self-demotion is the caller's concern, not the directory's.
    pub async fn set_role(&self, id: &SubscriberId, role: Role) -> Result<Subscriber> {
        self.store
            .upsert(id, SubscriberPatch::role(role), Utc::now())
            .await
    }

    pub async fn find(&self, id: &SubscriberId) -> Result<Option<Subscriber>> {
        self.store.find(id).await
    }

    /// Language of a subscriber, or `None` if unknown.
    pub async fn language_of(&self, id: &SubscriberId) -> Result<Option<Language>> {
        Ok(self.store.find(id).await?.map(|s| s.language))
    }

    pub async fn all(&self) -> Result<Vec<Subscriber>> {
        self.store.list_all().await
    }

    pub async fn count_by_role(&self, role: Role) -> Result<u64> {
        self.store.count_by_role(role).await
    }

    pub async fn count_active_since(&self, since: DateTime<Utc>) -> Result<u64> {
        self.store.count_active_since(since).await
    }

    pub async fn group_by_language(&self) -> Result<Vec<(Language, u64)>> {
        self.store.group_by_language().await
    }
}
