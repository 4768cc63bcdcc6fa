//! Location queries: filter a user's sightings, seed and run the estimator

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    database::SightingStore,
    errors::PeerLocatorError,
    estimator::{LocationEstimator, Reference, MIN_REFERENCES},
    filter::{filter_sightings, initial_guess, FilterParams},
    models::{Coordinate, ObservedSighting, UserId},
};
use serde_helpers::*;

const NO_SIGHTINGS: &str = "No sightings matching given parameters.";
const NOT_ENOUGH_SIGHTINGS: &str = "Not enough sightings to estimate location, need at least three.";

/// Validated query parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryParams {
    pub user_id: UserId,
    pub filter: FilterParams,
}

impl QueryParams {
    /// Thresholds must be non-negative and finite
    pub fn try_new(
        user_id: UserId,
        max_distance: i64,
        max_accuracy: f64,
    ) -> Result<Self, PeerLocatorError> {
        if max_distance < 0 {
            return Err(PeerLocatorError::InvalidQueryParameter {
                name: "mdist",
                value: max_distance.to_string(),
            });
        }
        if !max_accuracy.is_finite() || max_accuracy < 0.0 {
            return Err(PeerLocatorError::InvalidQueryParameter {
                name: "macc",
                value: max_accuracy.to_string(),
            });
        }
        Ok(Self {
            user_id,
            filter: FilterParams {
                max_distance,
                max_accuracy,
            },
        })
    }

    /// Parse raw request parameters `id`, `mdist` and `macc`.
    ///
    /// A missing or non-numeric parameter is a client error.
    pub fn parse(
        id: Option<&str>,
        max_distance: Option<&str>,
        max_accuracy: Option<&str>,
    ) -> Result<Self, PeerLocatorError> {
        let user_id = UserId::try_from(required("id", id)?)?;
        let max_distance = parse_number::<i64>("mdist", required("mdist", max_distance)?)?;
        let max_accuracy = parse_number::<f64>("macc", required("macc", max_accuracy)?)?;
        Self::try_new(user_id, max_distance, max_accuracy)
    }
}

fn required<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str, PeerLocatorError> {
    value.ok_or(PeerLocatorError::InvalidQueryParameter {
        name,
        value: String::new(),
    })
}

fn parse_number<T: std::str::FromStr>(
    name: &'static str,
    value: &str,
) -> Result<T, PeerLocatorError> {
    value
        .trim()
        .parse()
        .map_err(|_| PeerLocatorError::InvalidQueryParameter {
            name,
            value: value.to_string(),
        })
}

/// Estimation part of a query response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuessResult {
    pub success: bool,
    /// Why no position was estimated, empty on success
    pub reason: String,
    /// Serialized as an empty object when there is no position
    #[serde(serialize_with = "serialize_optional_coordinate")]
    pub result: Option<Coordinate>,
}

impl GuessResult {
    fn failed(reason: &str) -> Self {
        Self {
            success: false,
            reason: reason.to_string(),
            result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    /// Every sighting that passed the filter
    pub sightings: Vec<ObservedSighting>,
    pub guess: GuessResult,
}

/// Answers location queries against a sighting store
pub struct QueryService<S> {
    store: S,
    estimator: LocationEstimator,
}

impl<S: SightingStore> QueryService<S> {
    pub fn new(store: S, estimator: LocationEstimator) -> Self {
        Self { store, estimator }
    }

    /// Estimate where a user is from their sightings.
    ///
    /// "No sightings" and "not enough sightings" are regular responses with
    /// `success == false`; only store failures are errors.
    pub async fn query(&self, params: &QueryParams) -> Result<QueryResponse, PeerLocatorError> {
        let sightings = self.store.sightings_for_user(params.user_id).await?;
        let total = sightings.len();
        let filtered = filter_sightings(sightings, &params.filter);

        debug!(
            "User {}: {} of {} sightings qualify ({} near, {} far)",
            params.user_id.value(),
            filtered.qualifying.len(),
            total,
            filtered.near.len(),
            filtered.far.len()
        );

        if filtered.qualifying.is_empty() {
            return Ok(QueryResponse {
                sightings: Vec::new(),
                guess: GuessResult::failed(NO_SIGHTINGS),
            });
        }

        let guess = match initial_guess(&filtered.near, &filtered.far) {
            Some(guess) if filtered.far.len() >= MIN_REFERENCES => guess,
            _ => {
                return Ok(QueryResponse {
                    sightings: filtered.qualifying,
                    guess: GuessResult::failed(NOT_ENOUGH_SIGHTINGS),
                })
            }
        };

        let references: Vec<Reference> = filtered.far.iter().map(Reference::from).collect();
        let estimate = self.estimator.estimate(guess.coordinate, &references);

        info!(
            "User {}: estimate success={} after {} iterations ({})",
            params.user_id.value(),
            estimate.success,
            estimate.iterations,
            estimate.message
        );

        Ok(QueryResponse {
            sightings: filtered.qualifying,
            guess: GuessResult {
                success: estimate.success,
                reason: if estimate.success {
                    String::new()
                } else {
                    estimate.message
                },
                result: estimate.coordinate,
            },
        })
    }
}

/// Custom serializers
mod serde_helpers {
    use serde::{ser::SerializeMap, Serialize, Serializer};

    use crate::models::Coordinate;

    pub fn serialize_optional_coordinate<S>(
        value: &Option<Coordinate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(coordinate) => coordinate.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }
}
