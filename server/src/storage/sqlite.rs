use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::time::Duration;
use uuid::Uuid;

use super::{InsertOutcome, LinkStore, StorageError, StorageResult};
use crate::models::{Click, Link, Location, NewClick, NewLink};

/// How long a writer waits for the database lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable store backed by SQLite. Multi-statement writes run inside a
/// transaction so a failure leaves earlier state untouched.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url` and apply
    /// the embedded migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let mut options = database_url
            .parse::<SqliteConnectOptions>()
            .with_context(|| format!("invalid SQLite URL '{database_url}'"))?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !database_url.contains(":memory:") {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");

        Ok(Self { pool })
    }
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Other(e.into())
}

// ── Row shapes ─────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct LinkRow {
    id: String,
    short_code: String,
    original_url: String,
    custom_alias: Option<String>,
    created_at: DateTime<Utc>,
    click_count: i64,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
}

impl TryFrom<LinkRow> for Link {
    type Error = StorageError;

    fn try_from(row: LinkRow) -> Result<Self, Self::Error> {
        Ok(Link {
            id: Uuid::parse_str(&row.id)
                .with_context(|| format!("corrupt link id '{}'", row.id))?,
            short_code: row.short_code,
            original_url: row.original_url,
            custom_alias: row.custom_alias,
            created_at: row.created_at,
            click_count: row.click_count.max(0) as u64,
            expires_at: row.expires_at,
            is_active: row.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ClickRow {
    id: String,
    short_code: String,
    timestamp: DateTime<Utc>,
    ip_address: String,
    user_agent: String,
    referer: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    region: Option<String>,
    city: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    timezone: Option<String>,
}

impl TryFrom<ClickRow> for Click {
    type Error = StorageError;

    fn try_from(row: ClickRow) -> Result<Self, Self::Error> {
        let location = Location {
            country: row.country,
            country_code: row.country_code,
            region: row.region,
            city: row.city,
            latitude: row.latitude,
            longitude: row.longitude,
            timezone: row.timezone,
        };
        // A click stored without any location comes back without one.
        let location = (location != Location::default()).then_some(location);

        Ok(Click {
            id: Uuid::parse_str(&row.id)
                .with_context(|| format!("corrupt click id '{}'", row.id))?,
            link_id: row.short_code.clone(),
            short_code: row.short_code,
            timestamp: row.timestamp,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            referer: row.referer,
            location,
        })
    }
}

// ── LinkStore ──────────────────────────────────────────────────────────────

#[async_trait]
impl LinkStore for SqliteStore {
    async fn insert_link(&self, link: NewLink) -> StorageResult<InsertOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Write before reading: a transaction that starts with a read cannot
        // take the write lock once another writer has committed.
        let link = link.into_link(Utc::now());
        let affected = sqlx::query(
            "INSERT INTO links
                 (id, short_code, original_url, custom_alias, created_at, click_count,
                  expires_at, is_active)
             SELECT ?1, ?2, ?3, ?4, ?5, 0, ?6, 1
             WHERE NOT EXISTS (SELECT 1 FROM links WHERE original_url = ?3)
             ON CONFLICT(short_code) DO NOTHING",
        )
        .bind(link.id.to_string())
        .bind(&link.short_code)
        .bind(&link.original_url)
        .bind(&link.custom_alias)
        .bind(link.created_at)
        .bind(link.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        if affected == 1 {
            tx.commit().await.map_err(db_err)?;
            return Ok(InsertOutcome::Created(link));
        }

        let existing: Option<LinkRow> = sqlx::query_as(
            "SELECT id, short_code, original_url, custom_alias, created_at, click_count,
                    expires_at, is_active
             FROM links WHERE original_url = ?1
             ORDER BY seq LIMIT 1",
        )
        .bind(&link.original_url)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        match existing {
            Some(row) => {
                tx.commit().await.map_err(db_err)?;
                Ok(InsertOutcome::Existing(row.try_into()?))
            }
            // Dropping `tx` rolls back.
            None => Err(StorageError::Conflict),
        }
    }

    async fn get_link(&self, short_code: &str) -> StorageResult<Option<Link>> {
        let row: Option<LinkRow> = sqlx::query_as(
            "SELECT id, short_code, original_url, custom_alias, created_at, click_count,
                    expires_at, is_active
             FROM links WHERE short_code = ?1",
        )
        .bind(short_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Link::try_from).transpose()
    }

    async fn list_links(&self) -> StorageResult<Vec<Link>> {
        let rows: Vec<LinkRow> = sqlx::query_as(
            "SELECT id, short_code, original_url, custom_alias, created_at, click_count,
                    expires_at, is_active
             FROM links ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Link::try_from).collect()
    }

    async fn contains(&self, short_code: &str) -> StorageResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM links WHERE short_code = ?1")
            .bind(short_code)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count > 0)
    }

    async fn increment_clicks(&self, short_code: &str) -> StorageResult<bool> {
        let affected =
            sqlx::query("UPDATE links SET click_count = click_count + 1 WHERE short_code = ?1")
                .bind(short_code)
                .execute(&self.pool)
                .await
                .map_err(db_err)?
                .rows_affected();
        Ok(affected > 0)
    }

    async fn set_active(&self, short_code: &str, active: bool) -> StorageResult<bool> {
        let affected = sqlx::query("UPDATE links SET is_active = ?1 WHERE short_code = ?2")
            .bind(active)
            .bind(short_code)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn record_click(&self, click: NewClick) -> StorageResult<Click> {
        let click = click.into_click();
        let loc = click.location.clone().unwrap_or_default();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT INTO clicks
                 (id, short_code, timestamp, ip_address, user_agent, referer,
                  country, country_code, region, city, latitude, longitude, timezone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(click.id.to_string())
        .bind(&click.short_code)
        .bind(click.timestamp)
        .bind(&click.ip_address)
        .bind(&click.user_agent)
        .bind(&click.referer)
        .bind(loc.country)
        .bind(loc.country_code)
        .bind(loc.region)
        .bind(loc.city)
        .bind(loc.latitude)
        .bind(loc.longitude)
        .bind(loc.timezone)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("UPDATE links SET click_count = click_count + 1 WHERE short_code = ?1")
            .bind(&click.short_code)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(click)
    }

    async fn clicks_for(&self, short_code: &str) -> StorageResult<Vec<Click>> {
        let rows: Vec<ClickRow> = sqlx::query_as(
            "SELECT id, short_code, timestamp, ip_address, user_agent, referer,
                    country, country_code, region, city, latitude, longitude, timezone
             FROM clicks WHERE short_code = ?1
             ORDER BY seq",
        )
        .bind(short_code)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Click::try_from).collect()
    }
}
