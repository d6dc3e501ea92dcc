use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::{
    composite::{Bitrate, BitrateTier},
    core::Point2D,
    error::{FoveateError, FoveateResult},
};

/// Run-wide configuration. Every field has a default, so a JSON file only needs the
/// values it overrides.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    pub weights: CostWeights,
    pub gaze: GazeConfig,
    pub composite: CompositeConfig,
    pub segment: SegmentConfig,
}

/// Weights of the gaze cost model. `boundary_point` and `boundary_line` weight the two
/// halves of the boundary term; the other four weight the top-level sum.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostWeights {
    pub boundary: f64,
    pub environment: f64,
    pub direction: f64,
    pub distance: f64,
    pub boundary_point: f64,
    pub boundary_line: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            boundary: 0.4,
            environment: 0.3,
            direction: 0.2,
            distance: 0.1,
            boundary_point: 0.5,
            boundary_line: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GazeConfig {
    /// Largest gaze displacement per frame, in pixels.
    pub max_speed: f64,
    pub grid_step: u32,
    pub grid_margin: u32,
    pub obstacle_count: usize,
    pub obstacle_margin: u32,
    /// Regenerate obstacles on every frame index divisible by this.
    pub obstacle_refresh_every: u64,
    pub boundary_inset: u32,
    pub initial_vector: Point2D,
    /// Fixed RNG seed for obstacle sampling; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            max_speed: 50.0,
            grid_step: 100,
            grid_margin: 100,
            obstacle_count: 3,
            obstacle_margin: 100,
            obstacle_refresh_every: 10,
            boundary_inset: 50,
            initial_vector: Point2D::new(1, 0),
            seed: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompositeConfig {
    pub high_radius: u32,
    pub med_radius: u32,
    pub low_tier: BitrateTier,
    pub med_tier: BitrateTier,
    pub high_tier: BitrateTier,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            high_radius: 200,
            med_radius: 400,
            low_tier: BitrateTier::new("low", Bitrate::kbps(700)),
            med_tier: BitrateTier::new("med", Bitrate::kbps(1500)),
            high_tier: BitrateTier::new("high", Bitrate::kbps(3000)),
        }
    }
}

impl CompositeConfig {
    pub fn tiers(&self) -> [&BitrateTier; 3] {
        [&self.low_tier, &self.med_tier, &self.high_tier]
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentConfig {
    pub fps: u32,
    /// Nominal segment length. Not used for the flush threshold, see `flush_after_secs`.
    pub segment_duration_secs: u32,
    /// Seconds of frames buffered before a flush.
    pub flush_after_secs: u32,
    /// ffmpeg `-bufsize` for segment encodes.
    pub bufsize: String,
    /// Flush a short trailing segment at end of stream instead of discarding it.
    pub flush_partial_on_drain: bool,
    pub output_dir: PathBuf,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            segment_duration_secs: 6,
            flush_after_secs: 30,
            bufsize: "3M".to_string(),
            flush_partial_on_drain: false,
            output_dir: PathBuf::from("segments/segmented_video"),
        }
    }
}

impl SegmentConfig {
    pub fn flush_threshold_frames(&self) -> usize {
        self.fps as usize * self.flush_after_secs as usize
    }
}

impl StreamConfig {
    pub fn from_json_str(s: &str) -> FoveateResult<Self> {
        let cfg: StreamConfig = serde_json::from_str(s)
            .map_err(|e| FoveateError::validation(format!("parse config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_path(path: &Path) -> FoveateResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: StreamConfig = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| FoveateError::validation(format!("parse config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> FoveateResult<()> {
        let w = &self.weights;
        for (name, v) in [
            ("boundary", w.boundary),
            ("environment", w.environment),
            ("direction", w.direction),
            ("distance", w.distance),
            ("boundary_point", w.boundary_point),
            ("boundary_line", w.boundary_line),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(FoveateError::validation(format!(
                    "cost weight '{name}' must be finite and non-negative"
                )));
            }
        }

        let g = &self.gaze;
        if !g.max_speed.is_finite() || g.max_speed <= 0.0 {
            return Err(FoveateError::validation("gaze max_speed must be positive"));
        }
        if g.grid_step == 0 {
            return Err(FoveateError::validation("gaze grid_step must be non-zero"));
        }
        if g.obstacle_refresh_every == 0 {
            return Err(FoveateError::validation(
                "gaze obstacle_refresh_every must be non-zero",
            ));
        }

        for tier in self.composite.tiers() {
            if tier.bitrate.as_kbps() == 0 {
                return Err(FoveateError::validation(format!(
                    "bitrate tier '{}' must be non-zero",
                    tier.name
                )));
            }
        }

        let s = &self.segment;
        if s.fps == 0 {
            return Err(FoveateError::validation("segment fps must be non-zero"));
        }
        if s.flush_after_secs == 0 {
            return Err(FoveateError::validation(
                "segment flush_after_secs must be non-zero",
            ));
        }
        if s.bufsize.trim().is_empty() {
            return Err(FoveateError::validation("segment bufsize must be set"));
        }
        Ok(())
    }
}
