//! Multilateration by nonlinear least squares.
//!
//! The target position `x` minimizes the mean squared difference between
//! the geodesic distance from `x` to each reference fix and the distance
//! the peer reported at that fix:
//!
//! ```text
//! f(x) = 1/n Σ (d(x, p_i) - r_i)²
//! ```
//!
//! `f` is minimized over (latitude, longitude) in degrees with a
//! limited-memory BFGS iteration. Latitude and longitude are kept inside
//! their valid ranges by projecting every trial point onto the box
//! `[-90, 90] × [-180, 180]`. Gradients come from central differences.

use std::collections::VecDeque;
use std::time::Instant;

use nalgebra::Vector2;
use tracing::debug;

use crate::{
    config::EstimatorConfig,
    geodesy::geodesic_distance,
    models::{Coordinate, ObservedSighting},
};

/// Fewest references that determine a 2D position
pub const MIN_REFERENCES: usize = 3;

/// Central difference step, degrees (about a centimeter)
const GRADIENT_STEP: f64 = 1e-7;
/// Length of the first steepest descent trial step, degrees
const FIRST_STEP: f64 = 0.01;
/// Sufficient decrease constant of the Armijo condition
const ARMIJO_C1: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 60;

/// Known position and the distance reported from it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reference {
    pub coordinate: Coordinate,
    /// Reported distance to the target, meters
    pub distance: f64,
}

impl From<&ObservedSighting> for Reference {
    fn from(sighting: &ObservedSighting) -> Self {
        Reference {
            coordinate: sighting.coordinate,
            distance: sighting.distance as f64,
        }
    }
}

/// Outcome of a fit. Failure to converge is a normal outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub success: bool,
    /// Estimated target position, set only on success
    pub coordinate: Option<Coordinate>,
    pub message: String,
    pub iterations: u64,
    /// Objective value at the last accepted point, meters squared
    pub objective: f64,
}

impl Estimate {
    fn converged(x: &Vector2<f64>, message: &str, iterations: u64, objective: f64) -> Self {
        Self {
            success: true,
            coordinate: Some(to_coordinate(x)),
            message: message.to_string(),
            iterations,
            objective,
        }
    }

    fn failed(message: &str, iterations: u64, objective: f64) -> Self {
        Self {
            success: false,
            coordinate: None,
            message: message.to_string(),
            iterations,
            objective,
        }
    }
}

/// Mean squared error of the reported distances as seen from `x`
pub fn mean_squared_error(x: Coordinate, references: &[Reference]) -> f64 {
    let sum: f64 = references
        .iter()
        .map(|r| (geodesic_distance(x, r.coordinate) - r.distance).powi(2))
        .sum();
    sum / references.len() as f64
}

/// Correction pair of the inverse Hessian approximation
struct Correction {
    s: Vector2<f64>,
    y: Vector2<f64>,
    rho: f64,
}

pub struct LocationEstimator {
    config: EstimatorConfig,
}

impl LocationEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Fit the target position starting from `guess`
    pub fn estimate(&self, guess: Coordinate, references: &[Reference]) -> Estimate {
        if references.len() < MIN_REFERENCES {
            return Estimate::failed(
                "need at least three reference observations",
                0,
                f64::NAN,
            );
        }

        let objective = |x: &Vector2<f64>| mean_squared_error(to_coordinate(x), references);
        let started = Instant::now();

        let mut x = project(&Vector2::new(guess.latitude, guess.longitude));
        let mut f = objective(&x);
        if !f.is_finite() {
            return Estimate::failed("objective is not finite at the initial guess", 0, f);
        }
        let mut g = gradient(&objective, &x);
        let mut memory: VecDeque<Correction> = VecDeque::with_capacity(self.config.history);
        let mut iterations: u64 = 0;

        loop {
            let projected_gradient = (x - project(&(x - g))).amax();
            if projected_gradient <= self.config.gtol {
                return Estimate::converged(
                    &x,
                    "converged: projected gradient below tolerance",
                    iterations,
                    f,
                );
            }
            if iterations >= self.config.max_iterations {
                return Estimate::failed("iteration limit reached", iterations, f);
            }
            if started.elapsed() > self.config.timeout {
                return Estimate::failed("time limit exceeded", iterations, f);
            }
            iterations += 1;

            let mut direction = -two_loop(&g, &memory);
            if direction.dot(&g) >= 0.0 {
                memory.clear();
                direction = -g;
            }
            let first_step = if memory.is_empty() {
                (FIRST_STEP / direction.norm()).min(1.0)
            } else {
                1.0
            };

            let Some((x_new, f_new)) = line_search(&objective, &x, f, &g, &direction, first_step)
            else {
                if memory.is_empty() {
                    return Estimate::failed(
                        "line search could not reduce the objective",
                        iterations,
                        f,
                    );
                }
                debug!("Line search failed, restarting from steepest descent");
                memory.clear();
                continue;
            };

            let g_new = gradient(&objective, &x_new);
            let s = x_new - x;
            let y = g_new - g;
            let sy = s.dot(&y);
            if sy > f64::EPSILON * y.norm_squared() {
                if memory.len() == self.config.history {
                    memory.pop_front();
                }
                memory.push_back(Correction { s, y, rho: 1.0 / sy });
            }

            let reduction = (f - f_new) / f.abs().max(f_new.abs()).max(1.0);
            debug!(
                "Iteration {}: f={:.6}, x=({:.7}, {:.7}), reduction={:.3e}",
                iterations, f_new, x_new[0], x_new[1], reduction
            );

            x = x_new;
            f = f_new;
            g = g_new;

            if reduction <= self.config.ftol {
                return Estimate::converged(
                    &x,
                    "converged: relative reduction of objective below tolerance",
                    iterations,
                    f,
                );
            }
        }
    }
}

fn to_coordinate(x: &Vector2<f64>) -> Coordinate {
    Coordinate::new(x[0], x[1])
}

fn project(x: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(x[0].clamp(-90.0, 90.0), x[1].clamp(-180.0, 180.0))
}

fn gradient<F>(objective: &F, x: &Vector2<f64>) -> Vector2<f64>
where
    F: Fn(&Vector2<f64>) -> f64,
{
    let mut g = Vector2::zeros();
    for i in 0..2 {
        let mut step = Vector2::zeros();
        step[i] = GRADIENT_STEP;
        g[i] = (objective(&(x + step)) - objective(&(x - step))) / (2.0 * GRADIENT_STEP);
    }
    g
}

/// Product of the inverse Hessian approximation and `g`
fn two_loop(g: &Vector2<f64>, memory: &VecDeque<Correction>) -> Vector2<f64> {
    let mut q = *g;
    let mut alphas = Vec::with_capacity(memory.len());

    for c in memory.iter().rev() {
        let alpha = c.rho * c.s.dot(&q);
        q -= alpha * c.y;
        alphas.push(alpha);
    }

    let gamma = memory
        .back()
        .map(|c| c.s.dot(&c.y) / c.y.norm_squared())
        .unwrap_or(1.0);
    let mut r = gamma * q;

    for (c, alpha) in memory.iter().zip(alphas.iter().rev()) {
        let beta = c.rho * c.y.dot(&r);
        r += c.s * (alpha - beta);
    }

    r
}

/// Backtracking search along the projected path `P(x + αd)`
fn line_search<F>(
    objective: &F,
    x: &Vector2<f64>,
    f: f64,
    g: &Vector2<f64>,
    direction: &Vector2<f64>,
    first_step: f64,
) -> Option<(Vector2<f64>, f64)>
where
    F: Fn(&Vector2<f64>) -> f64,
{
    let mut alpha = first_step;

    for _ in 0..MAX_BACKTRACKS {
        let x_new = project(&(x + direction * alpha));
        let step = x_new - x;
        if step.amax() == 0.0 {
            return None;
        }
        let f_new = objective(&x_new);
        if f_new.is_finite() && f_new <= f + ARMIJO_C1 * g.dot(&step) {
            return Some((x_new, f_new));
        }
        alpha *= 0.5;
    }

    None
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::filter::initial_guess;

    fn references_to(target: Coordinate, points: &[(f64, f64)]) -> Vec<Reference> {
        points
            .iter()
            .map(|&(lat, lng)| {
                let coordinate = Coordinate::new(lat, lng);
                Reference {
                    coordinate,
                    distance: geodesic_distance(target, coordinate),
                }
            })
            .collect()
    }

    const POINTS: [(f64, f64); 4] = [
        (48.1400, 11.5800),
        (48.1330, 11.5720),
        (48.1395, 11.5700),
        (48.1340, 11.5810),
    ];

    fn closest(references: &[Reference]) -> Coordinate {
        references
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .map(|r| r.coordinate)
            .unwrap()
    }

    #[test]
    fn converges_to_exact_target() {
        let target = Coordinate::new(48.137154, 11.576124);
        let references = references_to(target, &POINTS);
        let estimator = LocationEstimator::new(EstimatorConfig::default());

        let estimate = estimator.estimate(closest(&references), &references);

        assert!(estimate.success, "{}", estimate.message);
        let found = estimate.coordinate.unwrap();
        let error = geodesic_distance(found, target);
        assert!(error < 1.0, "error {} m", error);
    }

    #[test]
    fn converges_with_three_references() {
        let target = Coordinate::new(-33.8688, 151.2093);
        let references = references_to(
            target,
            &[(-33.8650, 151.2050), (-33.8720, 151.2060), (-33.8690, 151.2150)],
        );
        let estimator = LocationEstimator::new(EstimatorConfig::default());

        let estimate = estimator.estimate(closest(&references), &references);

        assert!(estimate.success, "{}", estimate.message);
        assert!(geodesic_distance(estimate.coordinate.unwrap(), target) < 1.0);
    }

    #[test]
    fn noisy_distances_land_near_target() {
        let target = Coordinate::new(48.137154, 11.576124);
        let mut references = references_to(target, &POINTS);
        for (reference, noise) in references.iter_mut().zip([7.0, -5.0, 3.0, -8.0]) {
            reference.distance += noise;
        }
        let estimator = LocationEstimator::new(EstimatorConfig::default());

        let estimate = estimator.estimate(closest(&references), &references);

        assert!(estimate.success, "{}", estimate.message);
        assert!(geodesic_distance(estimate.coordinate.unwrap(), target) < 30.0);
        assert!(estimate.objective > 0.0);
    }

    #[test]
    fn seeded_from_near_centroid() {
        let target = Coordinate::new(60.1699, 24.9384);
        let references = references_to(
            target,
            &[(60.1720, 24.9420), (60.1670, 24.9350), (60.1710, 24.9330)],
        );
        let near = vec![ObservedSighting {
            coordinate: Coordinate::new(60.1702, 24.9386),
            distance: 40,
            accuracy: Some(5.0),
        }];
        let guess = initial_guess(&near, &[]).unwrap();
        let estimator = LocationEstimator::new(EstimatorConfig::default());

        let estimate = estimator.estimate(guess.coordinate, &references);

        assert!(estimate.success, "{}", estimate.message);
        assert!(geodesic_distance(estimate.coordinate.unwrap(), target) < 1.0);
    }

    #[test]
    fn too_few_references() {
        let target = Coordinate::new(48.137154, 11.576124);
        let references = references_to(target, &POINTS[..2]);
        let estimator = LocationEstimator::new(EstimatorConfig::default());

        let estimate = estimator.estimate(target, &references);

        assert!(!estimate.success);
        assert_eq!(estimate.coordinate, None);
        assert_eq!(estimate.iterations, 0);
    }

    #[test]
    fn iteration_limit_is_not_convergence() {
        let target = Coordinate::new(48.137154, 11.576124);
        let references = references_to(target, &POINTS);
        let estimator = LocationEstimator::new(EstimatorConfig {
            max_iterations: 1,
            timeout: Duration::from_secs(60),
            ..EstimatorConfig::default()
        });

        let estimate = estimator.estimate(closest(&references), &references);

        assert!(!estimate.success);
        assert_eq!(estimate.coordinate, None);
        assert_eq!(estimate.message, "iteration limit reached");
        assert_eq!(estimate.iterations, 1);
    }

    #[test]
    fn time_limit_is_not_convergence() {
        let target = Coordinate::new(48.137154, 11.576124);
        let references = references_to(target, &POINTS);
        let estimator = LocationEstimator::new(EstimatorConfig {
            timeout: Duration::from_nanos(1),
            ..EstimatorConfig::default()
        });

        let estimate = estimator.estimate(closest(&references), &references);

        assert!(!estimate.success);
        assert_eq!(estimate.coordinate, None);
        assert_eq!(estimate.message, "time limit exceeded");
        assert_eq!(estimate.iterations, 0);
    }

    #[test]
    fn projection_keeps_coordinates_in_range() {
        let x = project(&Vector2::new(95.0, -200.0));
        assert_eq!(x, Vector2::new(90.0, -180.0));
    }

    #[test]
    fn two_loop_without_memory_is_identity() {
        let g = Vector2::new(3.0, -4.0);
        assert_eq!(two_loop(&g, &VecDeque::new()), g);
    }
}
