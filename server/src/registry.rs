//! Link Registry: validates creation requests, allocates short codes and
//! owns every [`Link`] through the injected [`LinkStore`].

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::{AppError, AppResult, ValidationError};
use crate::models::{Link, NewLink};
use crate::storage::{InsertOutcome, LinkStore, StorageError};

/// Length of generated short codes.
pub const CODE_LENGTH: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Top-level path segments owned by the router.
const RESERVED_ALIASES: &[&str] = &["api", "health"];

/// A creation request as it arrives over the wire.
#[derive(Debug, Clone, Default)]
pub struct CreateLink {
    pub url: String,
    pub custom_alias: Option<String>,
    pub expires_at: Option<String>,
}

/// What a visitor to `/:code` should get.
#[derive(Debug, Clone, PartialEq)]
pub enum RedirectTarget {
    Redirect(String),
    Expired,
    NotFound,
}

#[derive(Clone)]
pub struct LinkRegistry {
    store: Arc<dyn LinkStore>,
    max_code_attempts: u32,
}

impl LinkRegistry {
    pub fn new(store: Arc<dyn LinkStore>, max_code_attempts: u32) -> Self {
        Self {
            store,
            max_code_attempts: max_code_attempts.max(1),
        }
    }

    /// Create a link, or hand back the existing one if this exact URL was
    /// shortened before.
    pub async fn create_link(&self, req: CreateLink) -> AppResult<InsertOutcome> {
        let url = req.url.trim();
        if !is_valid_url(url) {
            return Err(ValidationError::InvalidUrl.into());
        }

        let expires_at = parse_expiry(req.expires_at.as_deref())?;
        let alias = req.custom_alias.filter(|a| !a.is_empty());

        let outcome = match alias {
            Some(alias) => self.create_with_alias(url, alias, expires_at).await?,
            None => self.create_with_random_code(url, expires_at).await?,
        };

        if let InsertOutcome::Created(link) = &outcome {
            tracing::info!(short_code = %link.short_code, "created link for {}", link.original_url);
        }
        Ok(outcome)
    }

    async fn create_with_alias(
        &self,
        url: &str,
        alias: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<InsertOutcome> {
        if !is_valid_custom_alias(&alias) {
            return Err(ValidationError::InvalidAlias.into());
        }
        if RESERVED_ALIASES
            .iter()
            .any(|r| r.eq_ignore_ascii_case(&alias))
        {
            return Err(ValidationError::ReservedAlias.into());
        }
        if !self.is_available(&alias).await? {
            return Err(ValidationError::AliasTaken.into());
        }

        let new_link = NewLink {
            short_code: alias.clone(),
            original_url: url.to_owned(),
            custom_alias: Some(alias),
            expires_at,
        };
        match self.store.insert_link(new_link).await {
            Ok(outcome) => Ok(outcome),
            // Lost a race against another creation of the same alias.
            Err(StorageError::Conflict) => Err(ValidationError::AliasTaken.into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_with_random_code(
        &self,
        url: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<InsertOutcome> {
        for _ in 0..self.max_code_attempts {
            let new_link = NewLink {
                short_code: generate_short_code(CODE_LENGTH),
                original_url: url.to_owned(),
                custom_alias: None,
                expires_at,
            };
            match self.store.insert_link(new_link).await {
                Ok(outcome) => return Ok(outcome),
                Err(StorageError::Conflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::CodeSpaceExhausted {
            attempts: self.max_code_attempts,
        })
    }

    pub async fn get_by_short_code(&self, code: &str) -> AppResult<Option<Link>> {
        Ok(self.store.get_link(code).await?)
    }

    /// Every link in insertion order.
    pub async fn list_all(&self) -> AppResult<Vec<Link>> {
        Ok(self.store.list_links().await?)
    }

    /// The `limit` most recently created links, newest first.
    pub async fn recent(&self, limit: usize) -> AppResult<Vec<Link>> {
        let mut links = self.list_all().await?;
        links.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        links.truncate(limit);
        Ok(links)
    }

    pub async fn is_available(&self, code: &str) -> AppResult<bool> {
        Ok(!self.store.contains(code).await?)
    }

    /// No-op for unknown codes.
    pub async fn increment_click_count(&self, code: &str) -> AppResult<()> {
        self.store.increment_clicks(code).await?;
        Ok(())
    }

    pub async fn set_active(&self, code: &str, active: bool) -> AppResult<Link> {
        if !self.store.set_active(code, active).await? {
            return Err(AppError::NotFound("Link"));
        }
        self.store
            .get_link(code)
            .await?
            .ok_or(AppError::NotFound("Link"))
    }

    pub async fn resolve_for_redirect(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<RedirectTarget> {
        let target = match self.store.get_link(code).await? {
            Some(link) if link.is_live(now) => RedirectTarget::Redirect(link.original_url),
            // Active but not live means expired.
            Some(link) if link.is_active => RedirectTarget::Expired,
            _ => RedirectTarget::NotFound,
        };
        Ok(target)
    }
}

/// `true` for any syntactically valid absolute URL.
pub fn is_valid_url(url: &str) -> bool {
    !url.is_empty() && url::Url::parse(url).is_ok()
}

/// 3–20 characters drawn from `[A-Za-z0-9_-]`.
pub fn is_valid_custom_alias(alias: &str) -> bool {
    (3..=20).contains(&alias.len())
        && alias
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Generate a random alphanumeric string of the given length.
pub fn generate_short_code(len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn parse_expiry(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| ValidationError::InvalidExpiry),
    }
}
