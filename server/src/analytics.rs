//! Analytics Engine: reduces one link and its click history to a report.
//!
//! [`compute_analytics`] is a pure function of its inputs. The caller passes
//! the reference clock, whose UTC offset decides where calendar days begin.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use woothee::parser::Parser;

use crate::agent;
use crate::models::{Click, Link};

/// Size of every top-N breakdown and of `recent_clicks`.
pub const TOP_N: usize = 10;
/// Number of calendar days in the click timeline, today included.
pub const TIMELINE_DAYS: i64 = 30;
/// Points closer than this on both axes share a geo bucket.
pub const GEO_MERGE_DEGREES: f64 = 0.1;
/// Referrer bucket for clicks without a usable referrer.
pub const DIRECT: &str = "Direct";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub link: Link,
    pub total_clicks: u64,
    pub clicks_today: u64,
    pub clicks_this_week: u64,
    pub clicks_this_month: u64,
    pub recent_clicks: Vec<Click>,
    pub top_countries: Vec<CountryStats>,
    pub top_devices: Vec<DeviceStats>,
    pub top_browsers: Vec<BrowserStats>,
    pub top_referrers: Vec<ReferrerStats>,
    pub click_timeline: Vec<TimelineData>,
    pub geo_data: Vec<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryStats {
    pub country: String,
    pub country_code: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStats {
    pub device: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowserStats {
    pub browser: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferrerStats {
    pub domain: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineData {
    pub date: NaiveDate,
    pub clicks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Render a percentage for display with one decimal, e.g. `42.9%`.
pub fn format_percentage(percentage: f64) -> String {
    format!("{percentage:.1}%")
}

impl fmt::Display for CountryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} ({})",
            self.country,
            self.country_code,
            self.count,
            format_percentage(self.percentage)
        )
    }
}

impl fmt::Display for DeviceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.device, self.count, format_percentage(self.percentage))
    }
}

impl fmt::Display for BrowserStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.browser, self.count, format_percentage(self.percentage))
    }
}

impl fmt::Display for ReferrerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.domain, self.count, format_percentage(self.percentage))
    }
}

// ── Reduction ──────────────────────────────────────────────────────────────

pub fn compute_analytics(link: Link, clicks: &[Click], now: DateTime<FixedOffset>) -> Analytics {
    let offset = *now.offset();
    let today = now.date_naive();
    let today_start = start_of_day(today, offset);
    let week_start = today_start - Duration::days(7);
    let month_start = today_start - Duration::days(30);

    let total_clicks = clicks.len() as u64;
    let count_since =
        |since: DateTime<Utc>| clicks.iter().filter(|c| c.timestamp >= since).count() as u64;

    Analytics {
        link,
        total_clicks,
        clicks_today: count_since(today_start),
        clicks_this_week: count_since(week_start),
        clicks_this_month: count_since(month_start),
        recent_clicks: recent_clicks(clicks),
        top_countries: top_countries(clicks, total_clicks),
        top_devices: top_devices(clicks, total_clicks),
        top_browsers: top_browsers(clicks, total_clicks),
        top_referrers: top_referrers(clicks, total_clicks),
        click_timeline: click_timeline(clicks, today, offset),
        geo_data: geo_points(clicks),
    }
}

fn start_of_day(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local_midnight = date.and_time(NaiveTime::MIN);
    let utc_midnight = local_midnight - Duration::seconds(i64::from(offset.local_minus_utc()));
    Utc.from_utc_datetime(&utc_midnight)
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn recent_clicks(clicks: &[Click]) -> Vec<Click> {
    let mut recent = clicks.to_vec();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    recent.truncate(TOP_N);
    recent
}

fn top_countries(clicks: &[Click], total: u64) -> Vec<CountryStats> {
    let mut tally = Tally::default();
    for loc in clicks.iter().filter_map(|c| c.location.as_ref()) {
        if let (Some(country), Some(code)) =
            (non_empty(&loc.country), non_empty(&loc.country_code))
        {
            tally.add((country.to_owned(), code.to_owned()));
        }
    }

    tally
        .top(TOP_N)
        .into_iter()
        .map(|((country, country_code), count)| CountryStats {
            country,
            country_code,
            count,
            percentage: percentage(count, total),
        })
        .collect()
}

fn top_devices(clicks: &[Click], total: u64) -> Vec<DeviceStats> {
    let parser = Parser::new();
    let mut tally = Tally::default();
    for click in clicks.iter().filter(|c| !c.user_agent.is_empty()) {
        tally.add(agent::classify(&parser, &click.user_agent).device);
    }

    tally
        .top(TOP_N)
        .into_iter()
        .map(|(device, count)| DeviceStats {
            device: device.to_owned(),
            count,
            percentage: percentage(count, total),
        })
        .collect()
}

fn top_browsers(clicks: &[Click], total: u64) -> Vec<BrowserStats> {
    let parser = Parser::new();
    let mut tally = Tally::default();
    for click in clicks.iter().filter(|c| !c.user_agent.is_empty()) {
        tally.add(agent::classify(&parser, &click.user_agent).browser);
    }

    tally
        .top(TOP_N)
        .into_iter()
        .map(|(browser, count)| BrowserStats {
            browser,
            count,
            percentage: percentage(count, total),
        })
        .collect()
}

fn top_referrers(clicks: &[Click], total: u64) -> Vec<ReferrerStats> {
    let mut tally = Tally::default();
    for click in clicks {
        tally.add(referrer_domain(click.referer.as_deref()));
    }

    tally
        .top(TOP_N)
        .into_iter()
        .map(|(domain, count)| ReferrerStats {
            domain,
            count,
            percentage: percentage(count, total),
        })
        .collect()
}

/// Hostname of the referrer without a leading `www.`, or [`DIRECT`].
pub fn referrer_domain(referer: Option<&str>) -> String {
    referer
        .filter(|r| !r.is_empty())
        .and_then(|r| url::Url::parse(r).ok())
        .and_then(|u| u.host_str().map(str::to_owned))
        .filter(|host| !host.is_empty())
        .map(|host| match host.strip_prefix("www.") {
            Some(rest) => rest.to_owned(),
            None => host,
        })
        .unwrap_or_else(|| DIRECT.to_owned())
}

fn click_timeline(clicks: &[Click], today: NaiveDate, offset: FixedOffset) -> Vec<TimelineData> {
    let mut timeline: Vec<TimelineData> = (0..TIMELINE_DAYS)
        .rev()
        .map(|days_ago| TimelineData {
            date: today - Duration::days(days_ago),
            clicks: 0,
        })
        .collect();
    let first_day = timeline[0].date;

    for click in clicks {
        let day = click.timestamp.with_timezone(&offset).date_naive();
        let idx = (day - first_day).num_days();
        if (0..TIMELINE_DAYS).contains(&idx) {
            timeline[idx as usize].clicks += 1;
        }
    }

    timeline
}

/// Greedy bucketing in arrival order: a click joins the first existing point
/// within [`GEO_MERGE_DEGREES`] on both axes, otherwise it starts a new point
/// labelled with its own city and country.
fn geo_points(clicks: &[Click]) -> Vec<GeoPoint> {
    let mut points: Vec<GeoPoint> = Vec::new();

    for loc in clicks.iter().filter_map(|c| c.location.as_ref()) {
        let (Some(lat), Some(lon)) = (loc.latitude, loc.longitude) else {
            continue;
        };

        let near = points.iter_mut().find(|p| {
            (p.latitude - lat).abs() < GEO_MERGE_DEGREES
                && (p.longitude - lon).abs() < GEO_MERGE_DEGREES
        });
        match near {
            Some(point) => point.count += 1,
            None => points.push(GeoPoint {
                latitude: lat,
                longitude: lon,
                count: 1,
                city: loc.city.clone(),
                country: loc.country.clone(),
            }),
        }
    }

    points
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Counts keyed by first appearance, so ranking ties keep first-seen order.
struct Tally<K> {
    entries: Vec<(K, u64)>,
    index: HashMap<K, usize>,
}

impl<K> Default for Tally<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> Tally<K> {
    fn add(&mut self, key: K) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 += 1,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, 1));
            }
        }
    }

    /// Highest counts first, at most `n` entries.
    fn top(mut self, n: usize) -> Vec<(K, u64)> {
        // sort_by is stable
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries.truncate(n);
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, NewClick, NewLink};

    const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-06-15T12:00:00+00:00").unwrap()
    }

    fn link() -> Link {
        NewLink {
            short_code: "demo1".into(),
            original_url: "https://example.com".into(),
            custom_alias: None,
            expires_at: None,
        }
        .into_link(Utc::now())
    }

    fn click_at(timestamp: &str) -> Click {
        NewClick {
            short_code: "demo1".into(),
            timestamp: DateTime::parse_from_rfc3339(timestamp).unwrap().with_timezone(&Utc),
            ip_address: "203.0.113.1".into(),
            user_agent: CHROME.into(),
            referer: None,
            location: None,
        }
        .into_click()
    }

    fn located(country: &str, code: &str, city: &str, lat: f64, lon: f64) -> Click {
        let mut click = click_at("2024-06-15T10:00:00Z");
        click.location = Some(Location {
            country: Some(country.into()),
            country_code: Some(code.into()),
            city: Some(city.into()),
            latitude: Some(lat),
            longitude: Some(lon),
            ..Default::default()
        });
        click
    }

    #[test]
    fn empty_history() {
        let report = compute_analytics(link(), &[], now());
        assert_eq!(report.total_clicks, 0);
        assert_eq!(report.clicks_today, 0);
        assert!(report.recent_clicks.is_empty());
        assert!(report.top_countries.is_empty());
        assert!(report.top_referrers.is_empty());
        assert!(report.geo_data.is_empty());
        assert_eq!(report.click_timeline.len(), TIMELINE_DAYS as usize);
        assert!(report.click_timeline.iter().all(|d| d.clicks == 0));
    }

    #[test]
    fn time_windows() {
        let clicks = vec![
            click_at("2024-06-15T00:00:00Z"), // start of today
            click_at("2024-06-14T23:59:59Z"), // yesterday
            click_at("2024-06-08T00:00:00Z"), // exactly seven days before today
            click_at("2024-06-07T12:00:00Z"), // eight days ago
            click_at("2024-05-16T00:00:00Z"), // exactly thirty days before today
            click_at("2024-05-15T23:00:00Z"), // outside the month
        ];
        let report = compute_analytics(link(), &clicks, now());
        assert_eq!(report.total_clicks, 6);
        assert_eq!(report.clicks_today, 1);
        assert_eq!(report.clicks_this_week, 3);
        assert_eq!(report.clicks_this_month, 5);
    }

    #[test]
    fn windows_follow_the_reference_offset() {
        // 23:30 UTC on the 14th is already the 15th in UTC+2.
        let now = DateTime::parse_from_rfc3339("2024-06-15T09:00:00+02:00").unwrap();
        let clicks = vec![click_at("2024-06-14T22:30:00Z"), click_at("2024-06-14T21:30:00Z")];
        let report = compute_analytics(link(), &clicks, now);
        assert_eq!(report.clicks_today, 1);
        let last = report.click_timeline.last().unwrap();
        assert_eq!(last.date, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
        assert_eq!(last.clicks, 1);
    }

    #[test]
    fn recent_clicks_are_newest_first_and_capped() {
        let clicks: Vec<Click> = (0..15)
            .map(|h| click_at(&format!("2024-06-14T{h:02}:00:00Z")))
            .collect();
        let report = compute_analytics(link(), &clicks, now());
        assert_eq!(report.recent_clicks.len(), TOP_N);
        assert_eq!(report.recent_clicks[0].timestamp, clicks[14].timestamp);
        assert!(report
            .recent_clicks
            .windows(2)
            .all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn countries_rank_and_percent() {
        let mut clicks = vec![
            located("Japan", "JP", "Tokyo", 35.6762, 139.6503),
            located("United States", "US", "New York", 40.7128, -74.0060),
            located("United States", "US", "Boston", 42.3601, -71.0589),
            located("Germany", "DE", "Berlin", 52.52, 13.405),
        ];
        // No location at all, and a location missing its country code.
        clicks.push(click_at("2024-06-15T11:00:00Z"));
        let mut partial = click_at("2024-06-15T11:00:00Z");
        partial.location = Some(Location {
            country: Some("France".into()),
            ..Default::default()
        });
        clicks.push(partial);

        let report = compute_analytics(link(), &clicks, now());
        let codes: Vec<_> = report.top_countries.iter().map(|c| c.country_code.as_str()).collect();
        assert_eq!(codes, ["US", "JP", "DE"]);
        assert_eq!(report.top_countries[0].count, 2);
        assert!((report.top_countries[0].percentage - 100.0 * 2.0 / 6.0).abs() < 1e-9);

        let counted: u64 = report.top_countries.iter().map(|c| c.count).sum();
        assert!(counted <= report.total_clicks);
    }

    #[test]
    fn country_percentages_sum_to_100_when_all_located() {
        let clicks = vec![
            located("Japan", "JP", "Tokyo", 35.6762, 139.6503),
            located("United States", "US", "New York", 40.7128, -74.0060),
            located("United States", "US", "Boston", 42.3601, -71.0589),
        ];
        let report = compute_analytics(link(), &clicks, now());
        let sum: f64 = report.top_countries.iter().map(|c| c.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert_eq!(format_percentage(report.top_countries[0].percentage), "66.7%");
        assert_eq!(
            report.top_countries[1].to_string(),
            "Japan (JP): 1 (33.3%)"
        );
    }

    #[test]
    fn top_countries_keep_ten() {
        let clicks: Vec<Click> = (0..12)
            .map(|i| located(&format!("Country {i}"), &format!("C{i}"), "X", i as f64, 0.0))
            .collect();
        let report = compute_analytics(link(), &clicks, now());
        assert_eq!(report.top_countries.len(), TOP_N);
        // All tied: first seen wins.
        assert_eq!(report.top_countries[0].country_code, "C0");
        assert_eq!(report.top_countries[9].country_code, "C9");
    }

    #[test]
    fn geo_points_merge_nearby_clicks() {
        let clicks = vec![
            located("United States", "US", "New York", 40.7128, -74.0060),
            located("United States", "US", "Brooklyn", 40.6782, -73.9442),
            located("United Kingdom", "GB", "London", 51.5074, -0.1278),
            located("United States", "US", "Newark", 40.7357, -74.1724),
        ];
        let report = compute_analytics(link(), &clicks, now());
        assert_eq!(report.geo_data.len(), 3);
        assert_eq!(report.geo_data[0].count, 2);
        assert_eq!(report.geo_data[0].city.as_deref(), Some("New York"));
        assert_eq!(report.geo_data[1].city.as_deref(), Some("London"));
        // -74.1724 is more than 0.1 away from -74.0060
        assert_eq!(report.geo_data[2].city.as_deref(), Some("Newark"));
    }

    #[test]
    fn geo_points_include_zero_coordinates() {
        let clicks = vec![located("Null Island", "NI", "Nowhere", 0.0, 0.0)];
        let report = compute_analytics(link(), &clicks, now());
        assert_eq!(report.geo_data.len(), 1);
    }

    #[test]
    fn devices_and_browsers() {
        let mut phone = click_at("2024-06-15T10:00:00Z");
        phone.user_agent = IPHONE.into();
        let mut blank = click_at("2024-06-15T10:00:00Z");
        blank.user_agent = String::new();
        let clicks = vec![
            click_at("2024-06-15T10:00:00Z"),
            click_at("2024-06-15T10:00:00Z"),
            phone,
            blank,
        ];

        let report = compute_analytics(link(), &clicks, now());
        let devices: Vec<_> = report
            .top_devices
            .iter()
            .map(|d| (d.device.as_str(), d.count))
            .collect();
        assert_eq!(devices, [("desktop", 2), ("mobile", 1)]);
        assert_eq!(report.top_devices[0].percentage, 50.0);

        let browsers: Vec<_> = report
            .top_browsers
            .iter()
            .map(|b| (b.browser.as_str(), b.count))
            .collect();
        assert_eq!(browsers, [("Chrome", 2), ("Safari", 1)]);
    }

    #[test]
    fn referrers_strip_www_and_default_to_direct() {
        assert_eq!(referrer_domain(Some("https://www.twitter.com/status/1")), "twitter.com");
        assert_eq!(referrer_domain(Some("https://news.ycombinator.com")), "news.ycombinator.com");
        assert_eq!(referrer_domain(Some("https://example.www.com")), "example.www.com");
        assert_eq!(referrer_domain(Some("not a url")), DIRECT);
        assert_eq!(referrer_domain(Some("")), DIRECT);
        assert_eq!(referrer_domain(None), DIRECT);

        let mut a = click_at("2024-06-15T10:00:00Z");
        a.referer = Some("https://www.linkedin.com/feed".into());
        let mut b = click_at("2024-06-15T10:00:00Z");
        b.referer = Some("https://linkedin.com".into());
        let clicks = vec![click_at("2024-06-15T10:00:00Z"), a, b];

        let report = compute_analytics(link(), &clicks, now());
        assert_eq!(report.top_referrers[0].domain, "linkedin.com");
        assert_eq!(report.top_referrers[0].count, 2);
        assert_eq!(report.top_referrers[1].domain, DIRECT);
    }

    #[test]
    fn timeline_covers_thirty_days_oldest_first() {
        let clicks = vec![
            click_at("2024-06-15T08:00:00Z"),
            click_at("2024-06-15T09:00:00Z"),
            click_at("2024-05-17T09:00:00Z"), // first day of the timeline
            click_at("2024-05-16T09:00:00Z"), // one day too old
        ];
        let report = compute_analytics(link(), &clicks, now());
        let timeline = &report.click_timeline;
        assert_eq!(timeline.len(), 30);
        assert_eq!(timeline[0].date, NaiveDate::from_ymd_opt(2024, 5, 17).unwrap());
        assert_eq!(timeline[0].clicks, 1);
        assert_eq!(timeline[29].date, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
        assert_eq!(timeline[29].clicks, 2);
        assert_eq!(timeline.iter().map(|d| d.clicks).sum::<u64>(), 3);
    }

    #[test]
    fn report_serializes_with_wire_names() {
        let report = compute_analytics(link(), &[click_at("2024-06-15T10:00:00Z")], now());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["totalClicks"], 1);
        assert_eq!(value["clicksToday"], 1);
        assert_eq!(value["link"]["shortCode"], "demo1");
        assert_eq!(value["clickTimeline"][29]["date"], "2024-06-15");
        assert_eq!(value["topReferrers"][0]["domain"], "Direct");
        assert!(value["geoData"].as_array().unwrap().is_empty());
    }
}
