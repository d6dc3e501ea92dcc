use std::path::PathBuf;

use crate::{
    composite::{Bitrate, RegionCompositor},
    config::StreamConfig,
    core::{Canvas, Point2D},
    encode_ffmpeg::SegmentEncoder,
    error::{FoveateError, FoveateResult, Stage},
    gaze::{GazePredictor, ObstacleSet},
    segment::{AppendOutcome, DrainOutcome, FlushOutcome, SegmentBuffer},
    source::TierSources,
    telemetry::{GazeTelemetry, ProgressReporter},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// All requested frames were processed.
    #[default]
    Completed,
    /// A tier ran out of frames (or failed to decode) before the requested count.
    SourceExhausted,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunReport {
    pub frames_processed: u64,
    pub segments_written: u32,
    pub segments_dropped: u32,
    /// Frames lost to failed segment encodes.
    pub frames_dropped: u64,
    /// Trailing frames discarded at end of stream.
    pub frames_discarded: u64,
    /// Times the obstacle set was regenerated.
    pub obstacle_refreshes: u64,
    pub bitrate: Option<Bitrate>,
    pub stop: StopReason,
}

impl RunReport {
    fn apply_flush(&mut self, outcome: &FlushOutcome) {
        match outcome {
            FlushOutcome::Written(_) => self.segments_written += 1,
            FlushOutcome::Dropped { frames, .. } => {
                self.segments_dropped += 1;
                self.frames_dropped += *frames as u64;
            }
        }
    }
}

/// Per-frame loop: three tier frames -> gaze point -> composited frame -> segment buffer.
pub struct Pipeline<E: SegmentEncoder> {
    canvas: Canvas,
    refresh_every: u64,
    predictor: GazePredictor,
    compositor: RegionCompositor,
    segments: SegmentBuffer<E>,
    boundary: [Point2D; 4],
    obstacles: ObstacleSet,
    snapshot: Option<PathBuf>,
}

impl<E: SegmentEncoder> Pipeline<E> {
    pub fn new(cfg: StreamConfig, canvas: Canvas, encoder: E) -> FoveateResult<Self> {
        cfg.validate()?;
        let predictor = GazePredictor::new(canvas, cfg.gaze.clone(), cfg.weights);
        let boundary = predictor.boundary_points();
        Ok(Self {
            canvas,
            refresh_every: cfg.gaze.obstacle_refresh_every,
            predictor,
            compositor: RegionCompositor::new(cfg.composite),
            segments: SegmentBuffer::new(cfg.segment, encoder)?,
            boundary,
            obstacles: ObstacleSet::default(),
            snapshot: None,
        })
    }

    /// Also write the first composited frame as a PNG.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    pub fn segments(&self) -> &SegmentBuffer<E> {
        &self.segments
    }

    pub fn predictor(&self) -> &GazePredictor {
        &self.predictor
    }

    /// Obstacles currently fed to the cost model.
    pub fn obstacles(&self) -> &ObstacleSet {
        &self.obstacles
    }

    /// Processes up to `total_frames` frames, then drains the segment buffer.
    ///
    /// `sources` is consumed and released on every exit path. Gaze, compositing and
    /// buffering errors stop the run and are returned as [`FoveateError::Stage`]; segments
    /// written before that stay on disk. Encode failures only drop the affected segment.
    #[tracing::instrument(skip_all, fields(total_frames = total_frames, width = self.canvas.width, height = self.canvas.height))]
    pub fn run(
        &mut self,
        sources: TierSources,
        total_frames: u64,
        telemetry: &mut dyn GazeTelemetry,
        progress: &mut dyn ProgressReporter,
    ) -> FoveateResult<RunReport> {
        let mut sources = sources;
        let mut report = RunReport::default();

        let result = self.run_frames(&mut sources, total_frames, telemetry, progress, &mut report);
        sources.release();

        // A fatal error leaves the trailing batch unfinished; never encode it.
        let drained = if result.is_ok() {
            self.segments.drain()
        } else {
            self.segments.abort()
        };
        match drained {
            DrainOutcome::Empty => {}
            DrainOutcome::Discarded { frames } => report.frames_discarded += frames as u64,
            DrainOutcome::Flushed(outcome) => report.apply_flush(&outcome),
        }

        result?;
        tracing::info!(
            frames = report.frames_processed,
            written = report.segments_written,
            dropped = report.segments_dropped,
            stop = ?report.stop,
            "stream finished"
        );
        Ok(report)
    }

    fn run_frames(
        &mut self,
        sources: &mut TierSources,
        total_frames: u64,
        telemetry: &mut dyn GazeTelemetry,
        progress: &mut dyn ProgressReporter,
        report: &mut RunReport,
    ) -> FoveateResult<()> {
        for frame in 0..total_frames {
            let triple = match sources.read_triple() {
                Ok(Some(t)) => t,
                Ok(None) => {
                    tracing::info!(frame, "source exhausted");
                    report.stop = StopReason::SourceExhausted;
                    return Ok(());
                }
                Err(error) => {
                    tracing::warn!(frame, %error, "frame read failed, stopping");
                    report.stop = StopReason::SourceExhausted;
                    return Ok(());
                }
            };

            if frame % self.refresh_every == 0 {
                self.obstacles = self.predictor.generate_obstacles();
                report.obstacle_refreshes += 1;
                tracing::debug!(frame, obstacles = ?self.obstacles.points, "obstacles refreshed");
            }

            let gaze = self
                .predictor
                .generate_gaze_position(&self.boundary, self.obstacles.as_slice())
                .map_err(|e| fail(e, Stage::Gaze, frame))?;
            telemetry.record(frame, gaze);

            if triple.low.width != self.canvas.width || triple.low.height != self.canvas.height {
                let e = FoveateError::ShapeMismatch {
                    what: "low frame",
                    want_w: self.canvas.width,
                    want_h: self.canvas.height,
                    got_w: triple.low.width,
                    got_h: triple.low.height,
                };
                return Err(fail(e, Stage::Composite, frame));
            }
            let merged = self
                .compositor
                .merge(&triple, gaze)
                .map_err(|e| fail(e, Stage::Composite, frame))?;

            let bitrate = match report.bitrate {
                Some(b) => b,
                None => {
                    let b = self
                        .compositor
                        .segment_bitrate(self.canvas.width, self.canvas.height)
                        .map_err(|e| fail(e, Stage::Composite, frame))?;
                    tracing::info!(%b, "nominal segment bitrate");
                    report.bitrate = Some(b);
                    b
                }
            };

            if frame == 0
                && let Some(path) = &self.snapshot
            {
                match merged.save_png(path) {
                    Ok(()) => tracing::info!(path = %path.display(), "wrote snapshot"),
                    Err(error) => tracing::warn!(%error, "snapshot failed"),
                }
            }

            match self
                .segments
                .append(&merged, bitrate)
                .map_err(|e| fail(e, Stage::Segment, frame))?
            {
                AppendOutcome::Buffered { .. } => {}
                AppendOutcome::Flushed(outcome) => report.apply_flush(&outcome),
            }

            report.frames_processed += 1;
            progress.update(report.frames_processed, total_frames);
        }
        Ok(())
    }
}

fn fail(error: FoveateError, stage: Stage, frame: u64) -> FoveateError {
    tracing::error!(%stage, frame, %error, "stage failed");
    error.at_stage(stage, frame)
}
