//! Typed parameters for spatial queries
//!
//! These are validated before the executor runs and are usually passed both as
//! cache-key material and as the query function's input.

use crate::error::{QueryError, Result};
use crate::params::QueryParams;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_RADIUS_KM: f64 = 100.0;
pub const DEFAULT_RESOLUTION: u8 = 7;

/// Viewport bounds in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn from_params(params: &QueryParams) -> Result<Self> {
        Ok(Self {
            west: required_float(params, "west", -180.0, 180.0)?,
            south: required_float(params, "south", -90.0, 90.0)?,
            east: required_float(params, "east", -180.0, 180.0)?,
            north: required_float(params, "north", -90.0, 90.0)?,
        })
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let in_lat = lat >= self.south && lat <= self.north;
        // a viewport crossing the antimeridian has west > east
        let in_lon = if self.west <= self.east {
            lon >= self.west && lon <= self.east
        } else {
            lon >= self.west || lon <= self.east
        };
        in_lat && in_lon
    }
}

/// Point plus search radius for proximity queries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
    pub radius_km: f64,
}

impl Coordinates {
    /// Parse `lat`/`lon`, and `radius` (1 to 20000 km) when `with_radius` is set.
    /// The radius defaults to 100 km.
    pub fn from_params(params: &QueryParams, with_radius: bool) -> Result<Self> {
        let lat = required_float(params, "lat", -90.0, 90.0)?;
        let lon = required_float(params, "lon", -180.0, 180.0)?;

        let radius_km = match params.get("radius") {
            Some(raw) if with_radius => parse_float("radius", raw, 1.0, 20_000.0)?,
            _ => DEFAULT_RADIUS_KM,
        };

        Ok(Self {
            lat,
            lon,
            radius_km,
        })
    }
}

/// H3 hexagon resolution (6 = region, 7 = city, 8 = neighbourhood)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8")]
pub struct Resolution(u8);

impl Resolution {
    pub const MIN: u8 = 6;
    pub const MAX: u8 = 8;

    pub fn new(value: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(QueryError::validation(format!(
                "invalid resolution parameter (must be {} to {})",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn from_params(params: &QueryParams, default: u8) -> Result<Self> {
        match params.get("resolution") {
            None => Self::new(default),
            Some(raw) => {
                let value = raw.parse::<u8>().map_err(|_| {
                    QueryError::validation(format!(
                        "invalid resolution parameter (must be {} to {})",
                        Self::MIN,
                        Self::MAX
                    ))
                })?;
                Self::new(value)
            }
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Resolution {
    type Error = QueryError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self(DEFAULT_RESOLUTION)
    }
}

/// Temporal bucket size for density and heatmap queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Hour,
    Day,
    Week,
    Month,
}

impl Interval {
    pub fn from_params(params: &QueryParams, default: Interval) -> Result<Self> {
        params.get("interval").map_or(Ok(default), str::parse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Hour => "hour",
            Interval::Day => "day",
            Interval::Week => "week",
            Interval::Month => "month",
        }
    }
}

impl FromStr for Interval {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hour" => Ok(Interval::Hour),
            "day" => Ok(Interval::Day),
            "week" => Ok(Interval::Week),
            "month" => Ok(Interval::Month),
            other => Err(QueryError::validation(format!(
                "invalid interval '{}' (must be hour, day, week, or month)",
                other
            ))),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn required_float(params: &QueryParams, name: &str, min: f64, max: f64) -> Result<f64> {
    let raw = params
        .get(name)
        .ok_or_else(|| QueryError::validation(format!("missing required parameter: {}", name)))?;
    parse_float(name, raw, min, max)
}

fn parse_float(name: &str, raw: &str, min: f64, max: f64) -> Result<f64> {
    match raw.parse::<f64>() {
        Ok(v) if v >= min && v <= max => Ok(v),
        _ => Err(QueryError::validation(format!(
            "invalid {} parameter (must be {:.1} to {:.1})",
            name, min, max
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox_params(west: &str, south: &str, east: &str, north: &str) -> QueryParams {
        QueryParams::new()
            .with("west", west)
            .with("south", south)
            .with("east", east)
            .with("north", north)
    }

    #[test]
    fn test_bounding_box_valid() {
        let bbox = BoundingBox::from_params(&bbox_params("-75", "40", "-73", "41")).unwrap();
        assert_eq!(bbox.west, -75.0);
        assert_eq!(bbox.north, 41.0);
        assert!(bbox.contains(40.7, -74.0));
        assert!(!bbox.contains(51.5, -0.1));
    }

    #[test]
    fn test_bounding_box_rejects_bad_input() {
        assert!(BoundingBox::from_params(&bbox_params("-181", "40", "-73", "41")).is_err());
        assert!(BoundingBox::from_params(&bbox_params("-75", "north", "-73", "41")).is_err());
        assert!(BoundingBox::from_params(&bbox_params("-75", "40", "-73", "NaN")).is_err());

        let missing = QueryParams::new().with("west", "1");
        let err = BoundingBox::from_params(&missing).unwrap_err();
        assert!(err.to_string().contains("missing required parameter: south"));
    }

    #[test]
    fn test_bounding_box_across_antimeridian() {
        let bbox = BoundingBox {
            west: 170.0,
            south: -50.0,
            east: -170.0,
            north: -30.0,
        };
        assert!(bbox.contains(-40.0, 175.0));
        assert!(bbox.contains(-40.0, -175.0));
        assert!(!bbox.contains(-40.0, 0.0));
    }

    #[test]
    fn test_coordinates_radius() {
        let params = QueryParams::new().with("lat", "40.7").with("lon", "-74.0");
        let coords = Coordinates::from_params(&params, true).unwrap();
        assert_eq!(coords.radius_km, DEFAULT_RADIUS_KM);

        let params = params.with("radius", "250");
        assert_eq!(Coordinates::from_params(&params, true).unwrap().radius_km, 250.0);
        // radius ignored unless requested
        assert_eq!(
            Coordinates::from_params(&params, false).unwrap().radius_km,
            DEFAULT_RADIUS_KM
        );

        let too_far = params.with("radius", "20001");
        assert!(Coordinates::from_params(&too_far, true).is_err());
    }

    #[test]
    fn test_resolution() {
        assert_eq!(
            Resolution::from_params(&QueryParams::new(), 7).unwrap().value(),
            7
        );
        let params = QueryParams::new().with("resolution", "8");
        assert_eq!(Resolution::from_params(&params, 7).unwrap().value(), 8);

        for bad in ["5", "9", "7.5", "x"] {
            let params = QueryParams::new().with("resolution", bad);
            assert!(Resolution::from_params(&params, 7).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_resolution_deserialize_is_checked() {
        let ok: Resolution = serde_json::from_str("8").unwrap();
        assert_eq!(ok.value(), 8);
        assert_eq!(serde_json::to_string(&ok).unwrap(), "8");

        assert!(serde_json::from_str::<Resolution>("3").is_err());
        assert!(serde_json::from_str::<Resolution>("9").is_err());
    }

    #[test]
    fn test_interval() {
        assert_eq!(
            Interval::from_params(&QueryParams::new(), Interval::Hour).unwrap(),
            Interval::Hour
        );
        let params = QueryParams::new().with("interval", "week");
        assert_eq!(
            Interval::from_params(&params, Interval::Hour).unwrap(),
            Interval::Week
        );
        assert!("fortnight".parse::<Interval>().is_err());
        assert_eq!(Interval::Month.to_string(), "month");
    }
}
