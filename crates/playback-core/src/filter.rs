//! Filter dimensions shared by every analytics and spatial query
//!
//! A [`LocationStatsFilter`] is built once per request from the raw query
//! parameters and is both handed to the query function and folded into the
//! cache key. Building it is deterministic: list parameters are sorted and
//! de-duplicated and the `days` window is kept relative, so two requests that
//! ask for the same data produce equal filters.

use crate::error::{QueryError, Result};
use crate::params::QueryParams;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Row limit applied to every filter unless a query overrides it
pub const DEFAULT_LIMIT: usize = 1000;

/// Largest accepted `days` window (ten years)
pub const MAX_DAYS: u32 = 3650;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStatsFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Relative window in days, resolved against the clock at query time
    pub days: Option<u32>,
    pub users: Vec<String>,
    pub media_types: Vec<String>,
    pub platforms: Vec<String>,
    pub players: Vec<String>,
    pub transcode_decisions: Vec<String>,
    pub video_resolutions: Vec<String>,
    pub video_codecs: Vec<String>,
    pub audio_codecs: Vec<String>,
    pub libraries: Vec<String>,
    pub content_ratings: Vec<String>,
    pub location_types: Vec<String>,
    pub server_ids: Vec<String>,
    pub years: Vec<i32>,
    pub limit: usize,
}

impl Default for LocationStatsFilter {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            days: None,
            users: Vec::new(),
            media_types: Vec::new(),
            platforms: Vec::new(),
            players: Vec::new(),
            transcode_decisions: Vec::new(),
            video_resolutions: Vec::new(),
            video_codecs: Vec::new(),
            audio_codecs: Vec::new(),
            libraries: Vec::new(),
            content_ratings: Vec::new(),
            location_types: Vec::new(),
            server_ids: Vec::new(),
            years: Vec::new(),
            limit: DEFAULT_LIMIT,
        }
    }
}

impl LocationStatsFilter {
    /// Build a filter from request parameters.
    ///
    /// Recognised parameters: `start_date`, `end_date` (RFC 3339), `days`
    /// (1 to 3650, ignored when `start_date` is present), `years` and the
    /// comma-separated lists `users`, `media_types`, `platforms`, `players`,
    /// `transcode_decisions`, `video_resolutions`, `video_codecs`,
    /// `audio_codecs`, `libraries`, `content_ratings`, `location_types` and
    /// `server_ids`. Unknown parameters are ignored.
    pub fn from_params(params: &QueryParams) -> Result<Self> {
        let mut filter = LocationStatsFilter::default();

        if let Some(raw) = params.get("start_date") {
            filter.start_date = Some(parse_rfc3339("start_date", raw)?);
        } else if let Some(raw) = params.get("days") {
            filter.days = Some(parse_days(raw)?);
        }

        if let Some(raw) = params.get("end_date") {
            filter.end_date = Some(parse_rfc3339("end_date", raw)?);
        }

        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(QueryError::validation(
                    "start_date must not be after end_date",
                ));
            }
        }

        let lists: [(&str, &mut Vec<String>); 12] = [
            ("users", &mut filter.users),
            ("media_types", &mut filter.media_types),
            ("platforms", &mut filter.platforms),
            ("players", &mut filter.players),
            ("transcode_decisions", &mut filter.transcode_decisions),
            ("video_resolutions", &mut filter.video_resolutions),
            ("video_codecs", &mut filter.video_codecs),
            ("audio_codecs", &mut filter.audio_codecs),
            ("libraries", &mut filter.libraries),
            ("content_ratings", &mut filter.content_ratings),
            ("location_types", &mut filter.location_types),
            ("server_ids", &mut filter.server_ids),
        ];
        for (name, field) in lists {
            if let Some(raw) = params.get(name) {
                *field = parse_comma_separated(raw);
            }
        }

        if let Some(raw) = params.get("years") {
            filter.years = parse_years(raw)?;
        }

        Ok(filter)
    }

    /// Start of the requested window: the explicit `start_date`, or `now`
    /// minus `days` when only a relative window was given.
    pub fn effective_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.start_date
            .or_else(|| self.days.map(|d| now - Duration::days(i64::from(d))))
    }

    pub fn with_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users = normalize(users.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_days(mut self, days: u32) -> Self {
        self.start_date = None;
        self.days = Some(days);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

fn parse_rfc3339(name: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QueryError::validation(format!("invalid {} format: {}", name, e)))
}

fn parse_days(raw: &str) -> Result<u32> {
    match raw.parse::<u32>() {
        Ok(days) if (1..=MAX_DAYS).contains(&days) => Ok(days),
        _ => Err(QueryError::validation(format!(
            "invalid days parameter (must be 1 to {})",
            MAX_DAYS
        ))),
    }
}

fn parse_years(raw: &str) -> Result<Vec<i32>> {
    let mut years = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i32>()
                .map_err(|_| QueryError::validation(format!("invalid year: {}", s)))
        })
        .collect::<Result<Vec<_>>>()?;
    years.sort_unstable();
    years.dedup();
    Ok(years)
}

fn parse_comma_separated(raw: &str) -> Vec<String> {
    normalize(
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    )
}

fn normalize(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_empty_params_give_default_filter() {
        let filter = LocationStatsFilter::from_params(&QueryParams::new()).unwrap();
        assert_eq!(filter, LocationStatsFilter::default());
        assert_eq!(filter.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_comma_lists_are_normalized() {
        let params = QueryParams::new()
            .with("users", "bob, alice,,bob")
            .with("platforms", "Roku");
        let filter = LocationStatsFilter::from_params(&params).unwrap();

        assert_eq!(filter.users, vec!["alice", "bob"]);
        assert_eq!(filter.platforms, vec!["Roku"]);

        let reordered = QueryParams::new()
            .with("platforms", "Roku")
            .with("users", "alice,bob");
        assert_eq!(LocationStatsFilter::from_params(&reordered).unwrap(), filter);
    }

    #[test]
    fn test_days_stays_relative() {
        let params = QueryParams::new().with("days", "30");
        let a = LocationStatsFilter::from_params(&params).unwrap();
        let b = LocationStatsFilter::from_params(&params).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.days, Some(30));
        assert!(a.start_date.is_none());

        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(
            a.effective_start(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_start_date_wins_over_days() {
        let params = QueryParams::new()
            .with("start_date", "2024-01-01T00:00:00Z")
            .with("days", "7");
        let filter = LocationStatsFilter::from_params(&params).unwrap();
        assert_eq!(filter.days, None);
        assert_eq!(
            filter.start_date,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_malformed_params_are_rejected() {
        let cases = [
            ("start_date", "yesterday"),
            ("end_date", "2024-13-01"),
            ("days", "0"),
            ("days", "3651"),
            ("days", "abc"),
            ("years", "2023,twenty"),
        ];
        for (name, value) in cases {
            let params = QueryParams::new().with(name, value);
            let err = LocationStatsFilter::from_params(&params).unwrap_err();
            assert!(
                matches!(err, QueryError::Validation(_)),
                "{}={} should fail validation",
                name,
                value
            );
        }
    }

    #[test]
    fn test_inverted_date_range_is_rejected() {
        let params = QueryParams::new()
            .with("start_date", "2024-02-01T00:00:00Z")
            .with("end_date", "2024-01-01T00:00:00Z");
        assert!(LocationStatsFilter::from_params(&params).is_err());
    }

    #[test]
    fn test_years_parsed_and_sorted() {
        let params = QueryParams::new().with("years", "2024, 2022,2024");
        let filter = LocationStatsFilter::from_params(&params).unwrap();
        assert_eq!(filter.years, vec![2022, 2024]);
    }
}
