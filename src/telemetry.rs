use std::{
    fs::File,
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::{core::Point2D, error::FoveateResult};

/// Receives one gaze point per processed frame. Fire-and-forget.
pub trait GazeTelemetry {
    fn record(&mut self, frame: u64, gaze: Point2D);
}

impl GazeTelemetry for Vec<(u64, Point2D)> {
    fn record(&mut self, frame: u64, gaze: Point2D) {
        self.push((frame, gaze));
    }
}

/// Receives the number of frames processed so far out of a known total.
pub trait ProgressReporter {
    fn update(&mut self, done: u64, total: u64);
}

impl ProgressReporter for () {
    fn update(&mut self, _done: u64, _total: u64) {}
}

impl ProgressReporter for Vec<(u64, u64)> {
    fn update(&mut self, done: u64, total: u64) {
        self.push((done, total));
    }
}

/// Appends `frame,x,y` lines to a CSV file. Write errors are logged once and then ignored.
pub struct GazeLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl GazeLog {
    pub const DEFAULT_DIR: &'static str = "logs/gaze_prediction";

    pub fn create(path: impl Into<PathBuf>) -> FoveateResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create gaze log dir '{}'", parent.display()))?;
        }
        let file =
            File::create(&path).with_context(|| format!("create gaze log '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(b"frame,x,y\n")
            .with_context(|| format!("write gaze log header '{}'", path.display()))?;
        Ok(Self {
            path,
            writer: Some(writer),
        })
    }

    /// `logs/gaze_prediction/gaze_<unix seconds>.csv`
    pub fn default_path() -> PathBuf {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Path::new(Self::DEFAULT_DIR).join(format!("gaze_{secs}.csv"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GazeTelemetry for GazeLog {
    fn record(&mut self, frame: u64, gaze: Point2D) {
        let Some(w) = self.writer.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(w, "{frame},{},{}", gaze.x, gaze.y) {
            tracing::warn!(path = %self.path.display(), error = %e, "gaze log disabled after write failure");
            self.writer = None;
        }
    }
}

impl Drop for GazeLog {
    fn drop(&mut self) {
        if let Some(mut w) = self.writer.take() {
            let _ = w.flush();
        }
    }
}

/// Logs an info line each time another `step_percent` of the total is done.
pub struct LogProgress {
    step_percent: u64,
    next_percent: u64,
}

impl LogProgress {
    pub fn new(step_percent: u64) -> Self {
        let step_percent = step_percent.clamp(1, 100);
        Self {
            step_percent,
            next_percent: step_percent,
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ProgressReporter for LogProgress {
    fn update(&mut self, done: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = done.saturating_mul(100) / total;
        if percent >= self.next_percent {
            tracing::info!(done, total, percent, "progress");
            self.next_percent = (percent / self.step_percent + 1) * self.step_percent;
        }
    }
}
