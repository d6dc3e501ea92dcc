use rand::{Rng as _, SeedableRng as _, rngs::StdRng};

use crate::{
    config::{CostWeights, GazeConfig},
    core::{Canvas, Point2D},
    cost::total_cost,
    error::{FoveateError, FoveateResult},
};

/// Synthetic "environment structure" points fed to the cost model.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObstacleSet {
    pub points: Vec<Point2D>,
}

impl ObstacleSet {
    pub fn as_slice(&self) -> &[Point2D] {
        &self.points
    }
}

/// Last accepted gaze position and the movement that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GazeState {
    pub position: Point2D,
    pub vector: Point2D,
}

/// The four corner points inset by `inset` pixels.
pub fn boundary_points(canvas: Canvas, inset: u32) -> [Point2D; 4] {
    let w = canvas.width as i32;
    let h = canvas.height as i32;
    let i = inset as i32;
    [
        Point2D::new(i, i),
        Point2D::new(w - i, i),
        Point2D::new(i, h - i),
        Point2D::new(w - i, h - i),
    ]
}

/// Candidate gaze points, x-major then y. Coordinates start at `margin` and stop before
/// `dimension - margin`.
pub fn candidate_grid(canvas: Canvas, step: u32, margin: u32) -> Vec<Point2D> {
    let step = step.max(1) as usize;
    let start = i64::from(margin);
    let end_x = i64::from(canvas.width) - start;
    let end_y = i64::from(canvas.height) - start;
    if end_x <= start || end_y <= start {
        return Vec::new();
    }

    let mut out = Vec::new();
    for x in (start..end_x).step_by(step) {
        for y in (start..end_y).step_by(step) {
            out.push(Point2D::new(x as i32, y as i32));
        }
    }
    out
}

pub struct GazePredictor {
    canvas: Canvas,
    cfg: GazeConfig,
    weights: CostWeights,
    state: GazeState,
    rng: StdRng,
}

impl GazePredictor {
    /// Starts at the frame center moving along `cfg.initial_vector`.
    pub fn new(canvas: Canvas, cfg: GazeConfig, weights: CostWeights) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            state: GazeState {
                position: Point2D::new((canvas.width / 2) as i32, (canvas.height / 2) as i32),
                vector: cfg.initial_vector,
            },
            canvas,
            cfg,
            weights,
            rng,
        }
    }

    pub fn state(&self) -> GazeState {
        self.state
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn boundary_points(&self) -> [Point2D; 4] {
        boundary_points(self.canvas, self.cfg.boundary_inset)
    }

    /// Lowest-cost grid candidate relative to the current state. Ties keep the earliest
    /// candidate in grid order.
    pub fn select_candidate(
        &self,
        boundary: &[Point2D],
        obstacles: &[Point2D],
    ) -> FoveateResult<Point2D> {
        let mut best: Option<(f64, Point2D)> = None;
        for candidate in candidate_grid(self.canvas, self.cfg.grid_step, self.cfg.grid_margin) {
            let cost = total_cost(
                self.state.position,
                candidate,
                boundary,
                obstacles,
                self.state.vector,
                &self.weights,
            );
            match best {
                Some((min, _)) if cost >= min => {}
                _ => best = Some((cost, candidate)),
            }
        }

        best.map(|(_, p)| p)
            .ok_or(FoveateError::EmptyCandidateSet {
                width: self.canvas.width,
                height: self.canvas.height,
            })
    }

    /// Moves from the current position towards `target`, capped at `max_speed` pixels
    /// and clamped to `[0, width] x [0, height]`.
    pub fn smooth(&self, target: Point2D) -> Point2D {
        let last = self.state.position;
        let delta = target - last;
        let dist = delta.norm();
        let (mut dx, mut dy) = (f64::from(delta.x), f64::from(delta.y));
        if dist > self.cfg.max_speed {
            let scale = self.cfg.max_speed / dist;
            dx *= scale;
            dy *= scale;
        }
        // Truncating the step (not the sum) keeps the move within max_speed.
        let next = last + Point2D::new(dx.trunc() as i32, dy.trunc() as i32);
        Point2D::new(
            next.x.clamp(0, self.canvas.width as i32),
            next.y.clamp(0, self.canvas.height as i32),
        )
    }

    /// Picks the next gaze point and commits it as the new state.
    pub fn generate_gaze_position(
        &mut self,
        boundary: &[Point2D],
        obstacles: &[Point2D],
    ) -> FoveateResult<Point2D> {
        let target = self.select_candidate(boundary, obstacles)?;
        let next = self.smooth(target);
        let moved = next - self.state.position;
        if !moved.is_zero() {
            self.state.vector = moved;
        }
        self.state.position = next;
        tracing::trace!(x = next.x, y = next.y, tx = target.x, ty = target.y, "gaze step");
        Ok(next)
    }

    /// Samples `obstacle_count` points uniformly inside the `obstacle_margin` inset.
    pub fn generate_obstacles(&mut self) -> ObstacleSet {
        let (lo_x, hi_x) = inset_range(self.canvas.width, self.cfg.obstacle_margin);
        let (lo_y, hi_y) = inset_range(self.canvas.height, self.cfg.obstacle_margin);
        let points = (0..self.cfg.obstacle_count)
            .map(|_| {
                Point2D::new(
                    self.rng.random_range(lo_x..=hi_x),
                    self.rng.random_range(lo_y..=hi_y),
                )
            })
            .collect();
        ObstacleSet { points }
    }
}

// Collapses to the midpoint when the margin swallows the whole dimension.
fn inset_range(dim: u32, margin: u32) -> (i32, i32) {
    let lo = margin.min(dim / 2) as i32;
    let hi = (dim.saturating_sub(margin) as i32).max(lo);
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictor(w: u32, h: u32, cfg: GazeConfig, weights: CostWeights) -> GazePredictor {
        GazePredictor::new(Canvas::new(w, h).unwrap(), cfg, weights)
    }

    fn seeded() -> GazeConfig {
        GazeConfig {
            seed: Some(42),
            ..GazeConfig::default()
        }
    }

    #[test]
    fn grid_is_x_major_and_excludes_far_margin() {
        let grid = candidate_grid(Canvas::new(400, 500).unwrap(), 100, 100);
        assert_eq!(
            grid,
            vec![
                Point2D::new(100, 100),
                Point2D::new(100, 200),
                Point2D::new(100, 300),
                Point2D::new(200, 100),
                Point2D::new(200, 200),
                Point2D::new(200, 300),
            ]
        );
        assert!(candidate_grid(Canvas::new(200, 900).unwrap(), 100, 100).is_empty());
    }

    #[test]
    fn boundary_points_are_inset_corners() {
        let bps = boundary_points(Canvas::new(1920, 1080).unwrap(), 50);
        assert_eq!(bps[0], Point2D::new(50, 50));
        assert_eq!(bps[3], Point2D::new(1870, 1030));
    }

    #[test]
    fn ties_resolve_to_first_candidate() {
        let zero = CostWeights {
            boundary: 0.0,
            environment: 0.0,
            direction: 0.0,
            distance: 0.0,
            boundary_point: 0.0,
            boundary_line: 0.0,
        };
        let p = predictor(500, 500, seeded(), zero);
        let picked = p.select_candidate(&p.boundary_points(), &[]).unwrap();
        assert_eq!(picked, Point2D::new(100, 100));
    }

    #[test]
    fn selection_is_drawn_towards_obstacles() {
        let weights = CostWeights {
            boundary: 0.0,
            environment: 1.0,
            direction: 0.0,
            distance: 0.0,
            ..CostWeights::default()
        };
        let p = predictor(800, 800, seeded(), weights);
        let picked = p
            .select_candidate(&p.boundary_points(), &[Point2D::new(590, 210)])
            .unwrap();
        assert_eq!(picked, Point2D::new(600, 200));
    }

    #[test]
    fn empty_grid_fails_fast() {
        let mut p = predictor(150, 1000, seeded(), CostWeights::default());
        let bps = p.boundary_points();
        let err = p.generate_gaze_position(&bps, &[]).unwrap_err();
        assert!(matches!(
            err,
            FoveateError::EmptyCandidateSet {
                width: 150,
                height: 1000
            }
        ));
        assert_eq!(p.state().position, Point2D::new(75, 500));
    }

    #[test]
    fn smoothing_caps_speed_and_preserves_direction() {
        let p = predictor(1000, 1000, seeded(), CostWeights::default());
        // start is (500, 500); target 300px right, 400px down -> 50px along (3,4)
        let next = p.smooth(Point2D::new(800, 900));
        assert_eq!(next, Point2D::new(530, 540));
        let short = p.smooth(Point2D::new(510, 490));
        assert_eq!(short, Point2D::new(510, 490));
    }

    #[test]
    fn smoothing_clamps_to_frame() {
        let cfg = GazeConfig {
            max_speed: 10_000.0,
            ..seeded()
        };
        let p = predictor(300, 300, cfg, CostWeights::default());
        assert_eq!(p.smooth(Point2D::new(-40, 900)), Point2D::new(0, 300));
    }

    #[test]
    fn generate_updates_state_and_vector() {
        let mut p = predictor(1920, 1080, seeded(), CostWeights::default());
        let bps = p.boundary_points();
        let before = p.state().position;
        let next = p.generate_gaze_position(&bps, &[]).unwrap();
        assert_eq!(p.state().position, next);
        assert!(before.distance(next) <= 50.0);
        if next != before {
            assert_eq!(p.state().vector, next - before);
        }
    }

    #[test]
    fn obstacles_stay_inside_margin_and_are_seeded() {
        let mut a = predictor(1920, 1080, seeded(), CostWeights::default());
        let mut b = predictor(1920, 1080, seeded(), CostWeights::default());
        let oa = a.generate_obstacles();
        assert_eq!(oa, b.generate_obstacles());
        assert_eq!(oa.points.len(), 3);
        for p in oa.as_slice() {
            assert!((100..=1820).contains(&p.x));
            assert!((100..=980).contains(&p.y));
        }
    }

    #[test]
    fn obstacles_on_tiny_frames_collapse_to_center() {
        let mut p = predictor(120, 60, seeded(), CostWeights::default());
        for o in p.generate_obstacles().points {
            assert_eq!(o, Point2D::new(60, 30));
        }
    }
}
