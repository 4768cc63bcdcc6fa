//! Data models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::PeerLocatorError;

/// Identifier of an observed peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<&str> for UserId {
    type Error = PeerLocatorError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parsed = value
            .trim()
            .parse::<i64>()
            .map_err(|_| PeerLocatorError::InvalidQueryParameter {
                name: "id",
                value: value.to_string(),
            })?;
        Ok(Self(parsed))
    }
}

impl UserId {
    /// Get the raw id value
    pub fn value(&self) -> i64 {
        self.0
    }
}

/// WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One GPS fix as recorded by the scanning device.
///
/// Serializes in the shape of the location listing, i.e. without the log
/// and capture timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    /// Fix timestamp in milliseconds from Unix epoch, unique per location
    #[serde(rename = "timestamp")]
    pub fix_timestamp: i64,
    /// Time the log line was written, milliseconds from Unix epoch
    #[serde(skip)]
    pub log_timestamp: i64,
    /// Time the proximity scan captured the fix, milliseconds from Unix epoch
    #[serde(skip)]
    pub capture_timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude in meters, None if the fix had no altitude
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters, None if not reported
    #[serde(rename = "accuracy")]
    pub horizontal_accuracy: Option<f64>,
}

impl Location {
    /// Fix time as UTC datetime, None if the timestamp is out of range
    pub fn fix_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.fix_timestamp)
    }
}

/// Observed peer identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
}

/// Sighting awaiting insertion; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSighting {
    pub user_id: UserId,
    /// Fix timestamp of the location block the peer was listed in
    pub fix_timestamp: i64,
    /// Reported distance in meters
    pub distance: i64,
    pub expire_timestamp: i64,
}

/// Sighting joined to the location it was recorded at.
///
/// Serializes as one entry of the query response's sighting list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObservedSighting {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub distance: i64,
    #[serde(skip)]
    pub accuracy: Option<f64>,
}

/// User listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub sighting_count: i64,
}

/// Records produced by one parser run, in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecords {
    pub locations: Vec<Location>,
    pub users: Vec<User>,
    pub sightings: Vec<NewSighting>,
}
