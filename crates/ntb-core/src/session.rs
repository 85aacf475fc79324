//! Per-initiator transient state (drafts, pending admin actions, search, pagination).
//!
//! State lives behind [`SessionStore`] so a multi-instance deployment can back
//! it with an external cache. [`MemorySessionStore`] is the single-process map.

use std::{collections::HashMap, marker::PhantomData};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{domain::SubscriberId, Result};

/// Keyed by initiator; at most one value per initiator, last writer wins.
#[async_trait]
pub trait SessionStore<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &SubscriberId) -> Result<Option<T>>;

    async fn set(&self, key: &SubscriberId, value: T) -> Result<()>;

    /// Remove and return the current value.
    async fn remove(&self, key: &SubscriberId) -> Result<Option<T>>;
}

pub struct MemorySessionStore<T> {
    entries: Mutex<HashMap<SubscriberId, T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for MemorySessionStore<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            _marker: PhantomData,
        }
    }
}

impl<T> MemorySessionStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl<T> SessionStore<T> for MemorySessionStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &SubscriberId) -> Result<Option<T>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &SubscriberId, value: T) -> Result<()> {
        self.entries.lock().await.insert(key.clone(), value);
        Ok(())
    }

    async fn remove(&self, key: &SubscriberId) -> Result<Option<T>> {
        Ok(self.entries.lock().await.remove(key))
    }
}
