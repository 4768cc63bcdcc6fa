//! Errors for peer locator
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PeerLocatorError {
    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Invalid configuration: {message}")]
    ConfigurationError { message: String },

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Cannot read log file {path}: {source}")]
    LogUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Missing field {0}")]
    MissingField(&'static str),

    #[error("Invalid value for field {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Line has no bracketed field segment")]
    NoFieldSegment,

    #[error("Invalid query parameter {name}: {value:?}")]
    InvalidQueryParameter { name: &'static str, value: String },

    #[error("Database migration error")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),
}
