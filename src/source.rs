use std::{
    collections::VecDeque,
    io::Read as _,
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
};

use crate::{
    core::{Canvas, Frame, FrameTriple},
    encode_ffmpeg::is_ffmpeg_on_path,
    error::{FoveateError, FoveateResult},
};

/// A decoder yielding frames of one resolution tier.
///
/// `read` returns `Ok(None)` once the source is exhausted. `release` must be idempotent.
pub trait FrameSource {
    fn read(&mut self) -> FoveateResult<Option<Frame>>;

    fn release(&mut self);
}

/// Frames queued in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryFrameSource {
    frames: VecDeque<Frame>,
    released: bool,
}

impl MemoryFrameSource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            released: false,
        }
    }

    /// `count` copies of one frame.
    pub fn repeat(frame: Frame, count: usize) -> Self {
        Self::new(std::iter::repeat_n(frame, count))
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl FrameSource for MemoryFrameSource {
    fn read(&mut self) -> FoveateResult<Option<Frame>> {
        if self.released {
            return Ok(None);
        }
        Ok(self.frames.pop_front())
    }

    fn release(&mut self) {
        self.released = true;
        self.frames.clear();
    }
}

/// Decodes a video file with the system `ffmpeg`, scaled to a fixed canvas, as packed rgb24.
pub struct FfmpegFrameSource {
    path: PathBuf,
    canvas: Canvas,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl FfmpegFrameSource {
    pub fn open(path: impl AsRef<Path>, canvas: Canvas) -> FoveateResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(FoveateError::decoder(format!(
                "video source '{}' does not exist",
                path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(FoveateError::decoder(
                "ffmpeg is required for decoding, but was not found on PATH",
            ));
        }

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(&path)
            .args([
                "-vf",
                &format!("scale={}:{}", canvas.width, canvas.height),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                FoveateError::decoder(format!(
                    "failed to spawn ffmpeg decoder for '{}': {e}",
                    path.display()
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FoveateError::decoder("failed to open ffmpeg stdout (unexpected)"))?;

        tracing::debug!(path = %path.display(), width = canvas.width, height = canvas.height, "opened decoder");
        Ok(Self {
            path,
            canvas,
            child: Some(child),
            stdout: Some(stdout),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for FfmpegFrameSource {
    fn read(&mut self) -> FoveateResult<Option<Frame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; Frame::byte_len(self.canvas.width, self.canvas.height)];
        match stdout.read_exact(&mut buf) {
            Ok(()) => Frame::from_raw(self.canvas.width, self.canvas.height, buf).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(FoveateError::decoder(format!(
                "failed to read frame from '{}': {e}",
                self.path.display()
            ))),
        }
    }

    fn release(&mut self) {
        drop(self.stdout.take());
        if let Some(mut child) = self.child.take() {
            // The decoder may still be producing frames we will never read.
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(path = %self.path.display(), "released decoder");
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// The low/medium/high decoders of one run. All three are released on drop.
pub struct TierSources {
    pub low: Box<dyn FrameSource>,
    pub med: Box<dyn FrameSource>,
    pub high: Box<dyn FrameSource>,
}

impl TierSources {
    pub fn new(
        low: Box<dyn FrameSource>,
        med: Box<dyn FrameSource>,
        high: Box<dyn FrameSource>,
    ) -> Self {
        Self { low, med, high }
    }

    pub fn open_ffmpeg(
        low: impl AsRef<Path>,
        med: impl AsRef<Path>,
        high: impl AsRef<Path>,
        canvas: Canvas,
    ) -> FoveateResult<Self> {
        Ok(Self::new(
            Box::new(FfmpegFrameSource::open(low, canvas)?),
            Box::new(FfmpegFrameSource::open(med, canvas)?),
            Box::new(FfmpegFrameSource::open(high, canvas)?),
        ))
    }

    /// One frame from each tier, or `None` as soon as any tier runs dry.
    pub fn read_triple(&mut self) -> FoveateResult<Option<FrameTriple>> {
        let low = self.low.read()?;
        let med = self.med.read()?;
        let high = self.high.read()?;
        Ok(match (low, med, high) {
            (Some(low), Some(med), Some(high)) => Some(FrameTriple { low, med, high }),
            _ => None,
        })
    }

    pub fn release(&mut self) {
        self.low.release();
        self.med.release();
        self.high.release();
    }
}

impl Drop for TierSources {
    fn drop(&mut self) {
        self.release();
    }
}
