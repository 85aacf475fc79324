//! Flat admin/subscriber role policy.
//!
//! An id is an admin if it is on the configured allow-list or its directory
//! record carries `Role::Admin`. Allow-list ids are seeded into the directory
//! at startup and re-seeded whenever they are checked.

use tracing::{debug, info};

use crate::{
    directory::SubscriberDirectory,
    domain::{Role, SubscriberId},
    errors::Error,
    Result,
};

pub struct AdminPolicy {
    directory: SubscriberDirectory,
    allow_list: Vec<SubscriberId>,
}

impl AdminPolicy {
    pub fn new(directory: SubscriberDirectory, allow_list: Vec<SubscriberId>) -> Self {
        Self {
            directory,
            allow_list,
        }
    }

    pub fn is_configured_admin(&self, id: &SubscriberId) -> bool {
        self.allow_list.contains(id)
    }

    /// Upsert every allow-list id with `Role::Admin`. Safe to run repeatedly.
    pub async fn bootstrap(&self) -> Result<usize> {
        for id in &self.allow_list {
            self.directory.set_role(id, Role::Admin).await?;
        }
        info!(count = self.allow_list.len(), "initialized configured admins");
        Ok(self.allow_list.len())
    }

    /// Store errors propagate; they never degrade into "trusted".
    pub async fn is_admin(&self, id: &SubscriberId) -> Result<bool> {
        if self.is_configured_admin(id) {
            let sub = self.directory.find(id).await?;
            if sub.map(|s| s.role) != Some(Role::Admin) {
                self.directory.set_role(id, Role::Admin).await?;
            }
            return Ok(true);
        }

        let is_admin = self
            .directory
            .find(id)
            .await?
            .is_some_and(|s| s.role == Role::Admin);
        debug!(subscriber = %id, is_admin, "admin check");
        Ok(is_admin)
    }

    /// `Err(Error::Unauthorized)` unless `id` is an admin.
    pub async fn ensure_admin(&self, id: &SubscriberId) -> Result<()> {
        if self.is_admin(id).await? {
            return Ok(());
        }
        Err(Error::Unauthorized(id.to_string()))
    }

    pub async fn add_admin(&self, id: &SubscriberId) -> Result<()> {
        self.directory.set_role(id, Role::Admin).await?;
        info!(subscriber = %id, "admin added");
        Ok(())
    }

    /// Demote `id` to subscriber. Refusing self-demotion is the interactive
    /// caller's job; this only sets the role.
    pub async fn remove_admin(&self, id: &SubscriberId) -> Result<()> {
        self.directory.set_role(id, Role::Subscriber).await?;
        info!(subscriber = %id, "admin removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SubscriberStore};
    use std::sync::Arc;

    fn policy(store: Arc<MemoryStore>, ids: &[&str]) -> AdminPolicy {
        AdminPolicy::new(
            SubscriberDirectory::new(store),
            ids.iter().map(|s| SubscriberId::new(*s)).collect(),
        )
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let p = policy(store.clone(), &["1", "2"]);
        p.bootstrap().await.unwrap();
        p.bootstrap().await.unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|s| s.role == Role::Admin));
    }

    #[tokio::test]
    async fn allow_listed_id_is_admin_before_any_record_and_gets_seeded() {
        let store = Arc::new(MemoryStore::new());
        let p = policy(store.clone(), &["77"]);
        let id = SubscriberId::new("77");

        assert!(store.find(&id).await.unwrap().is_none());
        assert!(p.is_admin(&id).await.unwrap());
        assert_eq!(store.find(&id).await.unwrap().unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn unknown_id_is_not_admin() {
        let store = Arc::new(MemoryStore::new());
        let p = policy(store, &["1"]);
        assert!(!p.is_admin(&SubscriberId::new("2")).await.unwrap());
    }

    #[tokio::test]
    async fn ensure_admin_refuses_with_unauthorized() {
        let store = Arc::new(MemoryStore::new());
        let p = policy(store, &["1"]);
        p.ensure_admin(&SubscriberId::new("1")).await.unwrap();
        assert!(matches!(
            p.ensure_admin(&SubscriberId::new("2")).await,
            Err(Error::Unauthorized(id)) if id == "2"
        ));
    }

    #[tokio::test]
    async fn runtime_add_and_remove() {
        let store = Arc::new(MemoryStore::new());
        let p = policy(store, &[]);
        let id = SubscriberId::new("9");

        p.add_admin(&id).await.unwrap();
        assert!(p.is_admin(&id).await.unwrap());
        p.remove_admin(&id).await.unwrap();
        assert!(!p.is_admin(&id).await.unwrap());
    }
}
