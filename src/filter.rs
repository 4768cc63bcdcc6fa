//! Sighting selection and the solver seed

use crate::models::{Coordinate, ObservedSighting};

/// Sightings at or below this distance only seed the initial guess
pub const NEAR_DISTANCE_M: i64 = 100;

/// Caller thresholds for a location query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Largest reported distance to keep, meters
    pub max_distance: i64,
    /// Largest horizontal accuracy radius of the fix to keep, meters
    pub max_accuracy: f64,
}

impl FilterParams {
    /// A sighting whose fix has no recorded accuracy never qualifies.
    pub fn accepts(&self, sighting: &ObservedSighting) -> bool {
        sighting.distance <= self.max_distance
            && sighting
                .accuracy
                .is_some_and(|accuracy| accuracy <= self.max_accuracy)
    }
}

/// Qualifying sightings and their split at [`NEAR_DISTANCE_M`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredSightings {
    /// Every qualifying sighting, in store order
    pub qualifying: Vec<ObservedSighting>,
    pub near: Vec<ObservedSighting>,
    /// The only sightings used in the fit
    pub far: Vec<ObservedSighting>,
}

pub fn filter_sightings<I>(sightings: I, params: &FilterParams) -> FilteredSightings
where
    I: IntoIterator<Item = ObservedSighting>,
{
    let mut filtered = FilteredSightings::default();

    for sighting in sightings.into_iter().filter(|s| params.accepts(s)) {
        filtered.qualifying.push(sighting);
        if sighting.distance <= NEAR_DISTANCE_M {
            filtered.near.push(sighting);
        } else {
            filtered.far.push(sighting);
        }
    }

    filtered
}

/// Seed coordinate for the estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialGuess {
    pub coordinate: Coordinate,
    /// Smallest distance the guess is based on; [`NEAR_DISTANCE_M`] for a
    /// centroid of near sightings
    pub min_distance: i64,
}

/// Centroid of the near set if there is one, otherwise the closest far
/// sighting. None when both sets are empty.
pub fn initial_guess(
    near: &[ObservedSighting],
    far: &[ObservedSighting],
) -> Option<InitialGuess> {
    if !near.is_empty() {
        let count = near.len() as f64;
        let (lat_sum, lng_sum) = near.iter().fold((0.0, 0.0), |(lat, lng), s| {
            (lat + s.coordinate.latitude, lng + s.coordinate.longitude)
        });
        return Some(InitialGuess {
            coordinate: Coordinate::new(lat_sum / count, lng_sum / count),
            min_distance: NEAR_DISTANCE_M,
        });
    }

    // first of equally close sightings wins
    far.iter()
        .min_by_key(|s| s.distance)
        .map(|closest| InitialGuess {
            coordinate: closest.coordinate,
            min_distance: closest.distance,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sighting(lat: f64, lng: f64, distance: i64, accuracy: Option<f64>) -> ObservedSighting {
        ObservedSighting {
            coordinate: Coordinate::new(lat, lng),
            distance,
            accuracy,
        }
    }

    #[test]
    fn filter_applies_thresholds_and_partitions() {
        let params = FilterParams {
            max_distance: 500,
            max_accuracy: 20.0,
        };
        let sightings = vec![
            sighting(1.0, 1.0, 50, Some(5.0)),
            sighting(2.0, 2.0, 100, Some(20.0)),
            sighting(3.0, 3.0, 101, Some(10.0)),
            sighting(4.0, 4.0, 600, Some(10.0)),
            sighting(5.0, 5.0, 300, Some(25.0)),
            sighting(6.0, 6.0, 300, None),
            sighting(7.0, 7.0, 500, Some(1.0)),
        ];

        let filtered = filter_sightings(sightings, &params);

        let distances: Vec<i64> = filtered.qualifying.iter().map(|s| s.distance).collect();
        assert_eq!(distances, vec![50, 100, 101, 500]);
        assert_eq!(filtered.near.len(), 2);
        let far: Vec<i64> = filtered.far.iter().map(|s| s.distance).collect();
        assert_eq!(far, vec![101, 500]);
    }

    #[test]
    fn missing_accuracy_fails_filter() {
        let params = FilterParams {
            max_distance: i64::MAX,
            max_accuracy: f64::INFINITY,
        };
        assert!(!params.accepts(&sighting(0.0, 0.0, 10, None)));
        assert!(params.accepts(&sighting(0.0, 0.0, 10, Some(1e9))));
    }

    #[test]
    fn guess_is_centroid_of_near_set() {
        let near = vec![
            sighting(10.0, 20.0, 30, Some(5.0)),
            sighting(12.0, 22.0, 100, Some(5.0)),
            sighting(14.0, 27.0, 70, Some(5.0)),
        ];
        let far = vec![sighting(50.0, 50.0, 101, Some(5.0))];

        let guess = initial_guess(&near, &far).unwrap();
        assert!((guess.coordinate.latitude - 12.0).abs() < 1e-12);
        assert!((guess.coordinate.longitude - 23.0).abs() < 1e-12);
        assert_eq!(guess.min_distance, NEAR_DISTANCE_M);

        let guess = initial_guess(&near, &[]).unwrap();
        assert!((guess.coordinate.latitude - 12.0).abs() < 1e-12);
    }

    #[test]
    fn guess_is_closest_far_sighting() {
        let far = vec![
            sighting(1.0, 1.0, 400, Some(5.0)),
            sighting(2.0, 2.0, 150, Some(5.0)),
            sighting(3.0, 3.0, 150, Some(5.0)),
            sighting(4.0, 4.0, 900, Some(5.0)),
        ];

        let guess = initial_guess(&[], &far).unwrap();
        assert_eq!(guess.coordinate, Coordinate::new(2.0, 2.0));
        assert_eq!(guess.min_distance, 150);
    }

    #[test]
    fn no_guess_without_sightings() {
        assert_eq!(initial_guess(&[], &[]), None);
    }
}
