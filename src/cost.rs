//! Heuristic cost terms for ranking candidate gaze points. Lower is better.
//!
//! Every term is a pure function of its inputs. Note that smaller distances produce
//! smaller costs, so the minimum-cost search is drawn towards boundary points and
//! obstacles rather than away from them.

use crate::{config::CostWeights, core::Point2D};

/// Weighted nearest-boundary-point distance plus weighted nearest horizontal offset.
/// An empty boundary set costs nothing.
pub fn boundary_cost(point: Point2D, boundary_points: &[Point2D], weights: &CostWeights) -> f64 {
    if boundary_points.is_empty() {
        return 0.0;
    }
    let nearest_point = boundary_points
        .iter()
        .map(|bp| point.distance(*bp))
        .fold(f64::INFINITY, f64::min);
    let nearest_line = boundary_points
        .iter()
        .map(|bp| f64::from((point.x - bp.x).abs()))
        .fold(f64::INFINITY, f64::min);
    weights.boundary_point * nearest_point + weights.boundary_line * nearest_line
}

/// Mean Euclidean distance to the obstacle points, 0 when there are none.
pub fn environment_cost(point: Point2D, obstacle_points: &[Point2D]) -> f64 {
    if obstacle_points.is_empty() {
        return 0.0;
    }
    let sum: f64 = obstacle_points.iter().map(|op| point.distance(*op)).sum();
    sum / obstacle_points.len() as f64
}

/// Angle in radians between the move towards `target` and `current_vector`.
/// Zero-length vectors carry no direction, so they cost 0.
pub fn direction_change_cost(current: Point2D, target: Point2D, current_vector: Point2D) -> f64 {
    let to_target = target - current;
    let n_target = to_target.norm();
    let n_vector = current_vector.norm();
    if n_target == 0.0 || n_vector == 0.0 {
        return 0.0;
    }
    let dot = f64::from(to_target.x) * f64::from(current_vector.x)
        + f64::from(to_target.y) * f64::from(current_vector.y);
    (dot / (n_target * n_vector)).clamp(-1.0, 1.0).acos()
}

/// Straight-line travel distance. Obstacles are not routed around.
pub fn distance_cost(current: Point2D, target: Point2D) -> f64 {
    current.distance(target)
}

/// The four individual terms for one candidate, before top-level weighting.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CostTerms {
    pub boundary: f64,
    pub environment: f64,
    pub direction: f64,
    pub distance: f64,
}

impl CostTerms {
    pub fn evaluate(
        current: Point2D,
        target: Point2D,
        boundary_points: &[Point2D],
        obstacle_points: &[Point2D],
        current_vector: Point2D,
        weights: &CostWeights,
    ) -> Self {
        Self {
            boundary: boundary_cost(target, boundary_points, weights),
            environment: environment_cost(target, obstacle_points),
            direction: direction_change_cost(current, target, current_vector),
            distance: distance_cost(current, target),
        }
    }

    pub fn weighted_sum(&self, weights: &CostWeights) -> f64 {
        weights.boundary * self.boundary
            + weights.environment * self.environment
            + weights.direction * self.direction
            + weights.distance * self.distance
    }
}

pub fn total_cost(
    current: Point2D,
    target: Point2D,
    boundary_points: &[Point2D],
    obstacle_points: &[Point2D],
    current_vector: Point2D,
    weights: &CostWeights,
) -> f64 {
    CostTerms::evaluate(
        current,
        target,
        boundary_points,
        obstacle_points,
        current_vector,
        weights,
    )
    .weighted_sum(weights)
}
