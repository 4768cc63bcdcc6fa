//! Application configuration

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::PeerLocatorError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    pub query: Option<QueryConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Pool size used when none is configured
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ParserConfig {
    /// Lines to skip while looking for the peer list start before the
    /// location block is abandoned
    pub max_list_start_skip: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_list_start_skip: 64,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Relative objective reduction below which the fit has converged
    pub ftol: f64,
    /// Projected gradient norm below which the fit has converged
    pub gtol: f64,
    /// Number of correction pairs kept by the quasi-Newton update
    pub history: usize,
    pub max_iterations: u64,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            ftol: 1e-5,
            gtol: 1e-8,
            history: 10,
            max_iterations: 100_000,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestConfig {
    #[serde(default)]
    pub logs: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    pub user_id: i64,
    pub max_distance: i64,
    pub max_accuracy: f64,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("PEERLOC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("ingest.logs"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<(), PeerLocatorError> {
        self.database.validate()?;
        self.parser.validate()?;
        self.estimator.validate()?;
        Ok(())
    }
}

impl DatabaseConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), PeerLocatorError> {
        if self.url.trim().is_empty() {
            return Err(PeerLocatorError::ConfigurationError {
                message: "Database url cannot be empty".to_string(),
            });
        }
        if self.max_connections == 0 {
            return Err(PeerLocatorError::ConfigurationError {
                message: "Database pool needs at least one connection".to_string(),
            });
        }
        Ok(())
    }
}

impl ParserConfig {
    pub fn validate(&self) -> Result<(), PeerLocatorError> {
        if self.max_list_start_skip == 0 {
            return Err(PeerLocatorError::ConfigurationError {
                message: "max_list_start_skip must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), PeerLocatorError> {
        if !(self.ftol > 0.0) || !(self.gtol > 0.0) {
            return Err(PeerLocatorError::ConfigurationError {
                message: "Estimator tolerances must be positive".to_string(),
            });
        }
        if self.history == 0 {
            return Err(PeerLocatorError::ConfigurationError {
                message: "Estimator history must be greater than zero".to_string(),
            });
        }
        if self.max_iterations == 0 || self.timeout.is_zero() {
            return Err(PeerLocatorError::ConfigurationError {
                message: "Estimator iteration and time limits must be greater than zero"
                    .to_string(),
            });
        }
        Ok(())
    }
}
