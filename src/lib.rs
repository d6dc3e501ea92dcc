#![forbid(unsafe_code)]

pub mod composite;
pub mod config;
pub mod core;
pub mod cost;
pub mod encode_ffmpeg;
pub mod error;
pub mod gaze;
pub mod pipeline;
pub mod segment;
pub mod source;
pub mod telemetry;

pub use composite::{Bitrate, BitrateTier, Region, RegionCompositor, RegionMasks};
pub use config::{CompositeConfig, CostWeights, GazeConfig, SegmentConfig, StreamConfig};
pub use crate::core::{Canvas, Frame, FrameTriple, Point2D};
pub use cost::{CostTerms, total_cost};
pub use encode_ffmpeg::{
    FfmpegSegmentEncoder, RawSegment, SegmentEncoder, TierFiles, encode_tiers, is_ffmpeg_on_path,
};
pub use error::{FoveateError, FoveateResult, Stage};
pub use gaze::{GazePredictor, GazeState, ObstacleSet};
pub use pipeline::{Pipeline, RunReport, StopReason};
pub use segment::{
    AppendOutcome, BufferState, DrainOutcome, FlushOutcome, SegmentBuffer, SegmentInfo,
};
pub use source::{FfmpegFrameSource, FrameSource, MemoryFrameSource, TierSources};
pub use telemetry::{GazeLog, GazeTelemetry, LogProgress, ProgressReporter};
