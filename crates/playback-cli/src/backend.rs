//! In-memory playback dataset used by the CLI
//!
//! Stands in for the analytics database: it answers availability checks for
//! the executor and runs a handful of location queries over generated
//! playback records.

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use playback_core::{
    BoundingBox, Coordinates, Interval, LocationStatsFilter, RequestContext, Resolution,
};
use playback_executor::{Capability, QueryBackend};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const CITIES: &[(&str, &str, f64, f64)] = &[
    ("New York", "US", 40.7128, -74.0060),
    ("Newark", "US", 40.7357, -74.1724),
    ("Philadelphia", "US", 39.9526, -75.1652),
    ("London", "GB", 51.5074, -0.1278),
    ("Berlin", "DE", 52.5200, 13.4050),
    ("Tokyo", "JP", 35.6762, 139.6503),
    ("Sydney", "AU", -33.8688, 151.2093),
    ("Fiji", "FJ", -17.7134, 178.0650),
];

const USERS: &[&str] = &["alice", "bob", "carol", "dave", "erin"];
const MEDIA_TYPES: &[&str] = &["movie", "episode", "track"];
const PLATFORMS: &[&str] = &["Roku", "Chrome", "iOS", "Android"];

#[derive(Debug, Clone)]
pub struct PlaybackRecord {
    pub user: String,
    pub media_type: String,
    pub platform: String,
    pub city: &'static str,
    pub country: &'static str,
    pub lat: f64,
    pub lon: f64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationStat {
    pub city: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    pub playback_count: usize,
    pub unique_users: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyLocation {
    #[serde(flatten)]
    pub location: LocationStat,
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell {
    pub cell: String,
    pub resolution: u8,
    pub playback_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub bucket: String,
    pub playback_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserActivity {
    pub username: String,
    pub playback_count: usize,
}

#[derive(Debug)]
pub struct DemoBackend {
    records: Vec<PlaybackRecord>,
    spatial: bool,
    latency: Duration,
    executions: AtomicUsize,
}

impl DemoBackend {
    /// Generate `count` records spread over the last few months
    pub fn generate(count: usize, now: DateTime<Utc>) -> Self {
        let records = (0..count)
            .map(|i| {
                let (city, country, lat, lon) = CITIES[(i * 7 + i / 3) % CITIES.len()];
                PlaybackRecord {
                    user: USERS[(i * 3 + i / 5) % USERS.len()].to_string(),
                    media_type: MEDIA_TYPES[i % MEDIA_TYPES.len()].to_string(),
                    platform: PLATFORMS[(i / 2) % PLATFORMS.len()].to_string(),
                    city,
                    country,
                    lat,
                    lon,
                    started_at: now - ChronoDuration::hours(i as i64 * 7),
                }
            })
            .collect();

        Self {
            records,
            spatial: true,
            latency: Duration::ZERO,
            executions: AtomicUsize::new(0),
        }
    }

    pub fn with_spatial(mut self, spatial: bool) -> Self {
        self.spatial = spatial;
        self
    }

    /// Simulated per-query latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Number of queries that reached the backend
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }

    /// Wait out the simulated latency, giving up if the request is cancelled
    pub async fn round_trip(&self, ctx: &RequestContext) -> Result<()> {
        self.executions.fetch_add(1, Ordering::Relaxed);
        tokio::select! {
            _ = ctx.cancellation().cancelled() => {
                Err(anyhow::anyhow!("request {} cancelled", ctx.request_id()))
            }
            _ = tokio::time::sleep(self.latency) => Ok(()),
        }
    }

    pub fn viewport(&self, filter: &LocationStatsFilter, bbox: &BoundingBox) -> Vec<LocationStat> {
        let mut stats = self.location_stats(filter, |r| bbox.contains(r.lat, r.lon));
        stats.truncate(filter.limit);
        stats
    }

    pub fn nearby(
        &self,
        filter: &LocationStatsFilter,
        center: &Coordinates,
    ) -> Vec<NearbyLocation> {
        let mut nearby: Vec<_> = self
            .location_stats(filter, |r| {
                haversine_km(center.lat, center.lon, r.lat, r.lon) <= center.radius_km
            })
            .into_iter()
            .map(|location| NearbyLocation {
                distance_km: haversine_km(
                    center.lat,
                    center.lon,
                    location.latitude,
                    location.longitude,
                ),
                location,
            })
            .collect();

        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        nearby.truncate(filter.limit);
        nearby
    }

    /// Bin playbacks into square lat/lon cells whose edge halves with each
    /// resolution step
    pub fn grid_cells(
        &self,
        filter: &LocationStatsFilter,
        resolution: Resolution,
    ) -> Vec<GridCell> {
        let edge = 1.0 / f64::from(1u32 << (resolution.value() - Resolution::MIN));
        let mut cells: BTreeMap<String, usize> = BTreeMap::new();

        for record in self.matching(filter) {
            let row = (record.lat / edge).floor() as i64;
            let col = (record.lon / edge).floor() as i64;
            *cells.entry(format!("{}:{}:{}", resolution.value(), row, col)).or_default() += 1;
        }

        let mut cells: Vec<_> = cells
            .into_iter()
            .map(|(cell, playback_count)| GridCell {
                cell,
                resolution: resolution.value(),
                playback_count,
            })
            .collect();
        cells.sort_by(|a, b| b.playback_count.cmp(&a.playback_count));
        cells.truncate(filter.limit);
        cells
    }

    pub fn trends(&self, filter: &LocationStatsFilter, interval: Interval) -> Vec<TrendPoint> {
        let format = match interval {
            Interval::Hour => "%Y-%m-%d %H:00",
            Interval::Day => "%Y-%m-%d",
            Interval::Week => "%G-W%V",
            Interval::Month => "%Y-%m",
        };

        let mut buckets: BTreeMap<String, usize> = BTreeMap::new();
        for record in self.matching(filter) {
            *buckets.entry(record.started_at.format(format).to_string()).or_default() += 1;
        }

        buckets
            .into_iter()
            .map(|(bucket, playback_count)| TrendPoint {
                bucket,
                playback_count,
            })
            .collect()
    }

    pub fn top_users(&self, filter: &LocationStatsFilter, limit: usize) -> Vec<UserActivity> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for record in self.matching(filter) {
            *counts.entry(record.user.as_str()).or_default() += 1;
        }

        let mut users: Vec<_> = counts
            .into_iter()
            .map(|(username, playback_count)| UserActivity {
                username: username.to_string(),
                playback_count,
            })
            .collect();
        users.sort_by(|a, b| b.playback_count.cmp(&a.playback_count));
        users.truncate(limit.min(filter.limit));
        users
    }

    fn matching<'a>(
        &'a self,
        filter: &'a LocationStatsFilter,
    ) -> impl Iterator<Item = &'a PlaybackRecord> + 'a {
        let start = filter.effective_start(Utc::now());
        self.records.iter().filter(move |r| {
            start.map_or(true, |s| r.started_at >= s)
                && filter.end_date.map_or(true, |e| r.started_at <= e)
                && list_allows(&filter.users, &r.user)
                && list_allows(&filter.media_types, &r.media_type)
                && list_allows(&filter.platforms, &r.platform)
                && (filter.years.is_empty() || filter.years.contains(&r.started_at.year()))
        })
    }

    fn location_stats<P>(&self, filter: &LocationStatsFilter, keep: P) -> Vec<LocationStat>
    where
        P: Fn(&PlaybackRecord) -> bool,
    {
        let mut by_city: BTreeMap<&str, (&PlaybackRecord, usize, BTreeSet<&str>)> = BTreeMap::new();
        for record in self.matching(filter).filter(|r| keep(r)) {
            let entry = by_city
                .entry(record.city)
                .or_insert_with(|| (record, 0, BTreeSet::new()));
            entry.1 += 1;
            entry.2.insert(record.user.as_str());
        }

        let mut stats: Vec<_> = by_city
            .into_values()
            .map(|(record, playback_count, users)| LocationStat {
                city: record.city.to_string(),
                country: record.country.to_string(),
                latitude: record.lat,
                longitude: record.lon,
                playback_count,
                unique_users: users.len(),
            })
            .collect();
        stats.sort_by(|a, b| b.playback_count.cmp(&a.playback_count));
        stats
    }
}

impl QueryBackend for DemoBackend {
    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Spatial => self.spatial,
        }
    }
}

fn list_allows(allowed: &[String], value: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|a| a == value)
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (dlat, dlon) = ((lat2 - lat1).to_radians(), (lon2 - lon1).to_radians());
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
