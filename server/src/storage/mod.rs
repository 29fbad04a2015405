pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Click, Link, NewClick, NewLink};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short code already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Result of [`LinkStore::insert_link`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// A new link was stored under the requested code.
    Created(Link),
    /// A link with the identical original URL already existed and was left untouched.
    Existing(Link),
}

impl InsertOutcome {
    pub fn link(&self) -> &Link {
        match self {
            InsertOutcome::Created(link) | InsertOutcome::Existing(link) => link,
        }
    }

    pub fn into_link(self) -> Link {
        match self {
            InsertOutcome::Created(link) | InsertOutcome::Existing(link) => link,
        }
    }
}

/// Owner of every link and click. All records handed out are owned copies;
/// mutating them never reaches the store.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Atomically: return the first link whose `original_url` equals the new
    /// one, otherwise insert under `short_code` or fail with
    /// [`StorageError::Conflict`] if that code is taken.
    async fn insert_link(&self, link: NewLink) -> StorageResult<InsertOutcome>;

    async fn get_link(&self, short_code: &str) -> StorageResult<Option<Link>>;

    /// Every link, in insertion order.
    async fn list_links(&self) -> StorageResult<Vec<Link>>;

    async fn contains(&self, short_code: &str) -> StorageResult<bool>;

    /// Bump the click counter. Returns `false` for unknown codes.
    async fn increment_clicks(&self, short_code: &str) -> StorageResult<bool>;

    /// Flip `is_active`. Returns `false` for unknown codes.
    async fn set_active(&self, short_code: &str, active: bool) -> StorageResult<bool>;

    /// Append a click and bump its link's counter in one step. Clicks for
    /// unknown codes are kept.
    async fn record_click(&self, click: NewClick) -> StorageResult<Click>;

    /// Clicks for one code, in arrival order.
    async fn clicks_for(&self, short_code: &str) -> StorageResult<Vec<Click>>;
}
