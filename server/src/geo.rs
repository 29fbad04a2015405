use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::models::Location;

// ── Backends ───────────────────────────────────────────────────────────────

/// A source of IP → location answers. Implementations may be slow; the
/// [`GeoResolver`] bounds every call with a timeout.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Option<Location>;
}

/// Backend used when geolocation is switched off.
pub struct DisabledLookup;

#[async_trait]
impl GeoLookup for DisabledLookup {
    async fn lookup(&self, _ip: IpAddr) -> Option<Location> {
        None
    }
}

/// ip-api.com (or a compatible endpoint) over plain HTTP.
pub struct IpApiLookup {
    client: reqwest::Client,
    endpoint: String,
}

impl IpApiLookup {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
        })
    }
}

#[derive(Deserialize)]
struct IpApiResponse {
    status: Option<String>,
    message: Option<String>,
    country: Option<String>,
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
    #[serde(rename = "regionName", alias = "region")]
    region: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
}

#[async_trait]
impl GeoLookup for IpApiLookup {
    async fn lookup(&self, ip: IpAddr) -> Option<Location> {
        let url = format!(
            "{}/{}?fields=status,message,country,countryCode,regionName,city,lat,lon,timezone,query",
            self.endpoint, ip
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| tracing::debug!("geo lookup network error for {}: {}", ip, e))
            .ok()?;

        if !resp.status().is_success() {
            tracing::debug!("geo lookup for {} failed with HTTP {}", ip, resp.status());
            return None;
        }

        let body: IpApiResponse = resp
            .json()
            .await
            .map_err(|e| tracing::debug!("geo lookup parse error for {}: {}", ip, e))
            .ok()?;

        if body.status.as_deref() != Some("success") {
            tracing::debug!(
                "geo lookup returned non-success status for {}: {}",
                ip,
                body.message.as_deref().unwrap_or("no message")
            );
            return None;
        }

        let country = body.country.filter(|s| !s.is_empty())?;
        Some(Location {
            country: Some(country),
            country_code: body.country_code.filter(|s| !s.is_empty()),
            region: body.region.filter(|s| !s.is_empty()),
            city: body.city.filter(|s| !s.is_empty()),
            latitude: Some(body.lat?),
            longitude: Some(body.lon?),
            timezone: body.timezone.filter(|s| !s.is_empty()),
        })
    }
}

// ── Resolver ───────────────────────────────────────────────────────────────

/// Best-effort IP → location resolution in front of a [`GeoLookup`].
///
/// Loopback and private addresses resolve to [`local_development`] without
/// touching the backend. Public addresses go through an in-memory cache of at
/// most `cache_capacity` answers; when it is full an arbitrary entry makes
/// room. Lookups that time out are not cached and resolve to `None`.
#[derive(Clone)]
pub struct GeoResolver {
    backend: Arc<dyn GeoLookup>,
    cache: Arc<DashMap<IpAddr, Option<Location>>>,
    cache_capacity: usize,
    timeout: Duration,
}

/// Cache size used unless [`GeoResolver::with_cache_capacity`] says otherwise.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

impl GeoResolver {
    pub fn new(backend: Arc<dyn GeoLookup>, timeout: Duration) -> Self {
        Self {
            backend,
            cache: Arc::new(DashMap::new()),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            timeout,
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity.max(1);
        self
    }

    pub async fn resolve(&self, ip: &str) -> Option<Location> {
        // "::ffff:1.2.3.4" (any case) becomes 1.2.3.4
        let addr = match ip.trim().parse::<IpAddr>() {
            Ok(addr) => addr.to_canonical(),
            Err(_) => {
                tracing::debug!("not geolocating unparseable address '{}'", ip);
                return None;
            }
        };

        if is_private(addr) {
            return Some(local_development());
        }

        if let Some(entry) = self.cache.get(&addr) {
            return entry.clone();
        }

        match tokio::time::timeout(self.timeout, self.backend.lookup(addr)).await {
            Ok(result) => {
                self.remember(addr, result.clone());
                result
            }
            Err(_) => {
                tracing::debug!("geo lookup for {} timed out after {:?}", addr, self.timeout);
                None
            }
        }
    }

    fn remember(&self, addr: IpAddr, result: Option<Location>) {
        while self.cache.len() >= self.cache_capacity {
            let victim = self.cache.iter().next().map(|entry| *entry.key());
            match victim {
                Some(victim) => {
                    self.cache.remove(&victim);
                }
                None => break,
            }
        }
        self.cache.insert(addr, result);
    }
}

/// The fixed location reported for loopback and private-range visitors.
pub fn local_development() -> Location {
    Location {
        country: Some("Local Development".into()),
        country_code: Some("DEV".into()),
        region: Some("Local".into()),
        city: Some("Localhost".into()),
        latitude: Some(40.7128),
        longitude: Some(-74.0060),
        timezone: Some("America/New_York".into()),
    }
}

/// Return `true` for addresses that should never be sent to a public
/// geolocation API: loopback, link-local, private ranges, and IPv6 special
/// addresses.
fn is_private(ip: IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(addr) => {
            addr.is_loopback()          // 127.x.x.x
            || addr.is_private()        // 10/8, 172.16/12, 192.168/16
            || addr.is_link_local()     // 169.254.x.x
            || addr.is_unspecified()    // 0.0.0.0
            || addr.is_broadcast()
        }
        IpAddr::V6(addr) => {
            addr.is_loopback()       // ::1
            || addr.is_unspecified() // ::
            // fe80::/10  link-local
            || (addr.segments()[0] & 0xffc0) == 0xfe80
            // fc00::/7   unique-local
            || (addr.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        answer: Option<Location>,
    }

    #[async_trait]
    impl GeoLookup for Counting {
        async fn lookup(&self, _ip: IpAddr) -> Option<Location> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    struct Stalled;

    #[async_trait]
    impl GeoLookup for Stalled {
        async fn lookup(&self, _ip: IpAddr) -> Option<Location> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            None
        }
    }

    fn us() -> Location {
        Location {
            country: Some("United States".into()),
            country_code: Some("US".into()),
            latitude: Some(37.386),
            longitude: Some(-122.0838),
            ..Default::default()
        }
    }

    #[test]
    fn private_ranges() {
        let private = [
            "127.0.0.1",
            "10.0.0.1",
            "172.16.0.25",
            "192.168.1.1",
            "169.254.0.1",
            "::1",
            "fe80::1",
            "fd00::1",
            "::ffff:10.0.0.1",
            "::FFFF:192.168.1.1",
        ];
        for ip in private {
            assert!(is_private(ip.parse().unwrap()), "{ip} should be private");
        }
        for ip in ["8.8.8.8", "203.0.113.42", "2001:4860:4860::8888"] {
            assert!(!is_private(ip.parse().unwrap()), "{ip} should be public");
        }
    }

    #[tokio::test]
    async fn private_addresses_skip_the_backend() {
        let backend = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            answer: Some(us()),
        });
        let resolver = GeoResolver::new(backend.clone(), Duration::from_secs(1));

        for ip in ["192.168.1.1", "10.0.0.1", "::ffff:127.0.0.1", "::FFFF:192.168.1.1"] {
            assert_eq!(resolver.resolve(ip).await, Some(local_development()));
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn public_answers_are_cached() {
        let backend = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            answer: Some(us()),
        });
        let resolver = GeoResolver::new(backend.clone(), Duration::from_secs(1));

        assert_eq!(resolver.resolve("8.8.8.8").await, Some(us()));
        assert_eq!(resolver.resolve("8.8.8.8").await, Some(us()));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn misses_are_cached_too() {
        let backend = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            answer: None,
        });
        let resolver = GeoResolver::new(backend.clone(), Duration::from_secs(1));

        assert_eq!(resolver.resolve("8.8.4.4").await, None);
        assert_eq!(resolver.resolve("8.8.4.4").await, None);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unparseable_addresses_have_no_location() {
        let resolver = GeoResolver::new(Arc::new(DisabledLookup), Duration::from_secs(1));
        assert_eq!(resolver.resolve("not-an-ip").await, None);
        assert_eq!(resolver.resolve("").await, None);
    }

    #[tokio::test]
    async fn cache_never_grows_past_its_capacity() {
        let backend = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            answer: None,
        });
        let resolver =
            GeoResolver::new(backend.clone(), Duration::from_secs(1)).with_cache_capacity(8);

        for i in 0..100u8 {
            resolver.resolve(&format!("8.0.{i}.1")).await;
            assert!(resolver.cache.len() <= 8);
        }
        assert_eq!(resolver.cache.len(), 8);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 100);

        // The newest answer survives eviction.
        resolver.resolve("8.0.99.1").await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn mapped_addresses_share_a_cache_entry() {
        let backend = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            answer: Some(us()),
        });
        let resolver = GeoResolver::new(backend.clone(), Duration::from_secs(1));

        assert_eq!(resolver.resolve("::FFFF:8.8.8.8").await, Some(us()));
        assert_eq!(resolver.resolve("8.8.8.8").await, Some(us()));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_backends_time_out_to_none() {
        let resolver = GeoResolver::new(Arc::new(Stalled), Duration::from_millis(50));
        assert_eq!(resolver.resolve("8.8.8.8").await, None);
        assert!(resolver.cache.is_empty());
    }
}
