use chrono::{Duration, Utc};

use crate::models::{Location, NewClick, NewLink};
use crate::storage::{LinkStore, StorageResult};

struct SampleClick {
    short_code: &'static str,
    ago: Duration,
    ip: &'static str,
    user_agent: &'static str,
    referer: Option<&'static str>,
    location: (&'static str, &'static str, &'static str, &'static str, f64, f64, &'static str),
}

/// Populate an empty store with a few demo links and clicks. Returns `false`
/// without touching anything when the store already has links.
pub async fn seed_if_empty(store: &dyn LinkStore) -> StorageResult<bool> {
    if !store.list_links().await?.is_empty() {
        return Ok(false);
    }

    let links = [
        (
            "demo1",
            "https://example.com/very-long-url-that-needs-shortening-for-better-sharing",
            false,
        ),
        (
            "github",
            "https://github.com/username/repository-name-that-is-quite-long",
            true,
        ),
        (
            "portfolio",
            "https://myportfolio.com/work/project/detailed-case-study-with-images-and-description",
            true,
        ),
    ];
    for (code, url, is_alias) in links {
        store
            .insert_link(NewLink {
                short_code: code.to_owned(),
                original_url: url.to_owned(),
                custom_alias: is_alias.then(|| code.to_owned()),
                expires_at: None,
            })
            .await?;
    }

    let clicks = [
        SampleClick {
            short_code: "demo1",
            ago: Duration::hours(2),
            ip: "192.168.1.100",
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            referer: Some("https://twitter.com"),
            location: (
                "United States",
                "US",
                "New York",
                "New York",
                40.7128,
                -74.0060,
                "America/New_York",
            ),
        },
        SampleClick {
            short_code: "demo1",
            ago: Duration::hours(5),
            ip: "10.0.0.50",
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            referer: None,
            location: (
                "United Kingdom",
                "GB",
                "England",
                "London",
                51.5074,
                -0.1278,
                "Europe/London",
            ),
        },
        SampleClick {
            short_code: "github",
            ago: Duration::days(1),
            ip: "172.16.0.25",
            user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
            referer: Some("https://linkedin.com"),
            location: ("Japan", "JP", "Tokyo", "Tokyo", 35.6762, 139.6503, "Asia/Tokyo"),
        },
        SampleClick {
            short_code: "github",
            ago: Duration::days(3),
            ip: "192.168.2.10",
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
            referer: None,
            location: ("Germany", "DE", "Berlin", "Berlin", 52.5200, 13.4050, "Europe/Berlin"),
        },
        SampleClick {
            short_code: "portfolio",
            ago: Duration::days(6),
            ip: "203.0.113.42",
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
            referer: Some("https://facebook.com"),
            location: (
                "Australia",
                "AU",
                "New South Wales",
                "Sydney",
                -33.8688,
                151.2093,
                "Australia/Sydney",
            ),
        },
    ];

    let now = Utc::now();
    for sample in clicks {
        let (country, code, region, city, lat, lon, tz) = sample.location;
        store
            .record_click(NewClick {
                short_code: sample.short_code.to_owned(),
                timestamp: now - sample.ago,
                ip_address: sample.ip.to_owned(),
                user_agent: sample.user_agent.to_owned(),
                referer: sample.referer.map(str::to_owned),
                location: Some(Location {
                    country: Some(country.to_owned()),
                    country_code: Some(code.to_owned()),
                    region: Some(region.to_owned()),
                    city: Some(city.to_owned()),
                    latitude: Some(lat),
                    longitude: Some(lon),
                    timezone: Some(tz.to_owned()),
                }),
            })
            .await?;
    }

    tracing::info!("Seeded sample links and clicks");
    Ok(true)
}
