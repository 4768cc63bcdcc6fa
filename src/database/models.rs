// src/database/models.rs
use crate::models::{Coordinate, Location, ObservedSighting, UserId, UserSummary};

#[derive(Debug, sqlx::FromRow)]
pub(super) struct LocationRow {
    fix_ts: i64,
    log_ts: i64,
    cm_ts: i64,
    latitude: f64,
    longitude: f64,
    altitude: Option<f64>,
    accuracy: Option<f64>,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Location {
            fix_timestamp: row.fix_ts,
            log_timestamp: row.log_ts,
            capture_timestamp: row.cm_ts,
            latitude: row.latitude,
            longitude: row.longitude,
            altitude: row.altitude,
            horizontal_accuracy: row.accuracy,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct UserSummaryRow {
    id: i64,
    display_name: String,
    sighting_count: i64,
}

impl From<UserSummaryRow> for UserSummary {
    fn from(row: UserSummaryRow) -> Self {
        UserSummary {
            id: UserId::from(row.id),
            name: row.display_name,
            sighting_count: row.sighting_count,
        }
    }
}

/// Sighting joined to its location
#[derive(Debug, sqlx::FromRow)]
pub(super) struct SightingRow {
    latitude: f64,
    longitude: f64,
    distance: i64,
    accuracy: Option<f64>,
}

impl From<SightingRow> for ObservedSighting {
    fn from(row: SightingRow) -> Self {
        ObservedSighting {
            coordinate: Coordinate::new(row.latitude, row.longitude),
            distance: row.distance,
            accuracy: row.accuracy,
        }
    }
}
