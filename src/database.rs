// src/database.rs
mod models;

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{error, info};

use crate::{
    config::{DatabaseConfig, DEFAULT_MAX_CONNECTIONS},
    errors::PeerLocatorError,
    models::{Location, LogRecords, ObservedSighting, UserId, UserSummary},
};
use models::{LocationRow, SightingRow, UserSummaryRow};

/// Read access the location query needs from a record store
pub trait SightingStore {
    /// All sightings of a user joined to their locations, in insertion order
    fn sightings_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<ObservedSighting>, PeerLocatorError>> + Send;
}

/// Rows actually written by one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub locations: u64,
    pub users: u64,
    pub sightings: u64,
}

/// Row counts of the three tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCounts {
    pub locations: i64,
    pub users: i64,
    pub sightings: i64,
}

/// SQLite store for locations, users and sightings
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database described by the configuration
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, PeerLocatorError> {
        config.validate()?;
        Self::connect(&config.url, config.max_connections).await
    }

    /// Open or create the database at `url` with a default pool
    pub async fn from_url(url: &str) -> Result<Self, PeerLocatorError> {
        Self::connect(url, DEFAULT_MAX_CONNECTIONS).await
    }

    async fn connect(url: &str, max_connections: u32) -> Result<Self, PeerLocatorError> {
        info!(
            "Opening database: url={}, max_connections={}",
            url, max_connections
        );

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = match SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
        {
            Ok(pool) => pool,
            Err(e) => {
                error!("Failed to open database: {}", e);
                return Err(e.into());
            }
        };

        Self::new(pool).await
    }

    /// Wrap an existing pool, running pending migrations
    pub async fn new(pool: SqlitePool) -> Result<Self, PeerLocatorError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert the records of one parsed log in a single transaction.
    ///
    /// Locations and users already present are ignored. Sightings are always
    /// appended, so re-ingesting a log duplicates its sightings.
    pub async fn insert_records(
        &self,
        records: &LogRecords,
    ) -> Result<InsertSummary, PeerLocatorError> {
        let mut summary = InsertSummary::default();
        let mut tx = self.pool.begin().await?;

        for location in &records.locations {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO locations (
                    fix_ts, log_ts, cm_ts, latitude, longitude, altitude, accuracy
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(location.fix_timestamp)
            .bind(location.log_timestamp)
            .bind(location.capture_timestamp)
            .bind(location.latitude)
            .bind(location.longitude)
            .bind(location.altitude)
            .bind(location.horizontal_accuracy)
            .execute(&mut *tx)
            .await?;
            summary.locations += result.rows_affected();
        }

        for user in &records.users {
            let result =
                sqlx::query("INSERT OR IGNORE INTO users (id, display_name) VALUES (?1, ?2)")
                    .bind(user.id.value())
                    .bind(user.display_name.as_str())
                    .execute(&mut *tx)
                    .await?;
            summary.users += result.rows_affected();
        }

        for sighting in &records.sightings {
            let result = sqlx::query(
                "INSERT INTO sightings (user_id, fix_ts, distance, expire_ts)
                VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(sighting.user_id.value())
            .bind(sighting.fix_timestamp)
            .bind(sighting.distance)
            .bind(sighting.expire_timestamp)
            .execute(&mut *tx)
            .await?;
            summary.sightings += result.rows_affected();
        }

        tx.commit().await?;

        info!(
            "Committed {} locations, {} users, {} sightings",
            summary.locations, summary.users, summary.sightings
        );
        Ok(summary)
    }

    /// Users with at least one sighting and their sighting counts
    pub async fn users_with_sighting_counts(&self) -> Result<Vec<UserSummary>, PeerLocatorError> {
        let rows: Vec<UserSummaryRow> = sqlx::query_as(
            "SELECT u.id, u.display_name, COUNT(*) AS sighting_count
            FROM users u
            INNER JOIN sightings s ON s.user_id = u.id
            GROUP BY u.id, u.display_name
            ORDER BY u.id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserSummary::from).collect())
    }

    /// All recorded locations ordered by fix time
    pub async fn locations(&self) -> Result<Vec<Location>, PeerLocatorError> {
        let rows: Vec<LocationRow> = sqlx::query_as(
            "SELECT fix_ts, log_ts, cm_ts, latitude, longitude, altitude, accuracy
            FROM locations
            ORDER BY fix_ts",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Location::from).collect())
    }

    pub async fn table_counts(&self) -> Result<TableCounts, PeerLocatorError> {
        let locations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM locations")
            .fetch_one(&self.pool)
            .await?;
        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let sightings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sightings")
            .fetch_one(&self.pool)
            .await?;

        Ok(TableCounts {
            locations,
            users,
            sightings,
        })
    }
}

impl SightingStore for Database {
    async fn sightings_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ObservedSighting>, PeerLocatorError> {
        let rows: Vec<SightingRow> = sqlx::query_as(
            "SELECT l.latitude, l.longitude, s.distance, l.accuracy
            FROM sightings s
            INNER JOIN locations l ON l.fix_ts = s.fix_ts
            WHERE s.user_id = ?1
            ORDER BY s.id",
        )
        .bind(user_id.value())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ObservedSighting::from).collect())
    }
}
