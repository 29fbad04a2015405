use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{InsertOutcome, LinkStore, StorageError, StorageResult};
use crate::models::{Click, Link, NewClick, NewLink};

#[derive(Default)]
struct Inner {
    /// Links in insertion order.
    links: Vec<Link>,
    /// short_code -> index into `links`.
    by_code: HashMap<String, usize>,
    /// original_url -> index of the first link stored for it.
    by_url: HashMap<String, usize>,
    /// Append-only click log.
    clicks: Vec<Click>,
}

/// Process-local store. A single lock guards links and clicks together so
/// that every write is applied whole or not at all.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn insert_link(&self, link: NewLink) -> StorageResult<InsertOutcome> {
        let mut inner = self.inner.write().await;

        if let Some(&idx) = inner.by_url.get(&link.original_url) {
            return Ok(InsertOutcome::Existing(inner.links[idx].clone()));
        }
        if inner.by_code.contains_key(&link.short_code) {
            return Err(StorageError::Conflict);
        }

        let link = link.into_link(Utc::now());
        let idx = inner.links.len();
        inner.by_code.insert(link.short_code.clone(), idx);
        inner.by_url.insert(link.original_url.clone(), idx);
        inner.links.push(link.clone());

        Ok(InsertOutcome::Created(link))
    }

    async fn get_link(&self, short_code: &str) -> StorageResult<Option<Link>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_code
            .get(short_code)
            .map(|&idx| inner.links[idx].clone()))
    }

    async fn list_links(&self) -> StorageResult<Vec<Link>> {
        Ok(self.inner.read().await.links.clone())
    }

    async fn contains(&self, short_code: &str) -> StorageResult<bool> {
        Ok(self.inner.read().await.by_code.contains_key(short_code))
    }

    async fn increment_clicks(&self, short_code: &str) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(bump(&mut inner, short_code))
    }

    async fn set_active(&self, short_code: &str, active: bool) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.by_code.get(short_code).copied() {
            Some(idx) => {
                inner.links[idx].is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_click(&self, click: NewClick) -> StorageResult<Click> {
        let click = click.into_click();
        let mut inner = self.inner.write().await;
        bump(&mut inner, &click.short_code);
        inner.clicks.push(click.clone());
        Ok(click)
    }

    async fn clicks_for(&self, short_code: &str) -> StorageResult<Vec<Click>> {
        let inner = self.inner.read().await;
        Ok(inner
            .clicks
            .iter()
            .filter(|c| c.short_code == short_code)
            .cloned()
            .collect())
    }
}

fn bump(inner: &mut Inner, short_code: &str) -> bool {
    match inner.by_code.get(short_code).copied() {
        Some(idx) => {
            inner.links[idx].click_count += 1;
            true
        }
        None => false,
    }
}
