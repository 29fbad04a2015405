use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL used when generating short links, e.g. "https://go.example.com"
    /// Must NOT have a trailing slash.
    pub base_url: String,

    /// SQLite connection string, e.g. "sqlite:./linktrail.db".
    /// `None` keeps everything in process memory.
    pub database_url: Option<String>,

    pub database_max_connections: u32,

    /// When false, public IPs are recorded without a location.
    pub geo_enabled: bool,

    /// Base URL of the ip-api compatible geolocation endpoint
    pub geo_endpoint: String,

    /// Upper bound on a single geolocation lookup
    pub geo_timeout: Duration,

    /// Most IP answers kept in the geolocation cache
    pub geo_cache_capacity: usize,

    /// How many random short codes to try before giving up on a creation
    pub max_code_attempts: u32,

    /// Seed demo links and clicks into an empty store at startup
    pub seed_sample_data: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            base_url: "http://localhost:3000".into(),
            database_url: None,
            database_max_connections: 5,
            geo_enabled: true,
            geo_endpoint: "http://ip-api.com/json".into(),
            geo_timeout: Duration::from_millis(3000),
            geo_cache_capacity: crate::geo::DEFAULT_CACHE_CAPACITY,
            max_code_attempts: 16,
            seed_sample_data: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| defaults.port.to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let base_url = std::env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("memory"));

        let database_max_connections =
            parse_or("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?;

        let geo_timeout_ms = parse_or("GEO_TIMEOUT_MS", defaults.geo_timeout.as_millis() as u64)?;
        let max_code_attempts = parse_or("MAX_CODE_ATTEMPTS", defaults.max_code_attempts)?;
        if max_code_attempts == 0 {
            anyhow::bail!("MAX_CODE_ATTEMPTS must be at least 1");
        }
        let geo_cache_capacity = parse_or("GEO_CACHE_CAPACITY", defaults.geo_cache_capacity)?;
        if geo_cache_capacity == 0 {
            anyhow::bail!("GEO_CACHE_CAPACITY must be at least 1");
        }

        Ok(Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port,
            base_url,
            database_url,
            database_max_connections,
            geo_enabled: flag("GEO_ENABLED", defaults.geo_enabled),
            geo_endpoint: std::env::var("GEO_ENDPOINT").unwrap_or(defaults.geo_endpoint),
            geo_timeout: Duration::from_millis(geo_timeout_ms),
            geo_cache_capacity,
            max_code_attempts,
            seed_sample_data: flag("SEED_SAMPLE_DATA", defaults.seed_sample_data),
        })
    }

    /// Public URL for a short code.
    pub fn short_url(&self, short_code: &str) -> String {
        format!("{}/{}", self.base_url, short_code)
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_url_joins_base_and_code() {
        let config = AppConfig {
            base_url: "https://go.example.com".into(),
            ..AppConfig::default()
        };
        assert_eq!(config.short_url("abc123"), "https://go.example.com/abc123");
    }

    #[test]
    fn defaults_keep_data_in_memory() {
        let config = AppConfig::default();
        assert!(config.database_url.is_none());
        assert!(config.geo_enabled);
        assert_eq!(config.geo_timeout, Duration::from_secs(3));
        assert_eq!(config.geo_cache_capacity, 10_000);
    }
}
