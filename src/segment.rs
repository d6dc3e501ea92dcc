use std::{
    fs::File,
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::{
    composite::Bitrate,
    config::SegmentConfig,
    core::Frame,
    encode_ffmpeg::{RawSegment, SegmentEncoder},
    error::{FoveateError, FoveateResult},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferState {
    Accumulating,
    Flushing,
    Closed,
}

/// A segment file that was written successfully.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentInfo {
    pub index: u32,
    pub path: PathBuf,
    pub frames: usize,
    pub bitrate: Bitrate,
}

#[derive(Debug)]
pub enum FlushOutcome {
    Written(SegmentInfo),
    /// The encode failed; the buffered frames are gone and the index is reused.
    Dropped {
        index: u32,
        frames: usize,
        error: FoveateError,
    },
}

#[derive(Debug)]
pub enum AppendOutcome {
    Buffered { frames: usize },
    Flushed(FlushOutcome),
}

#[derive(Debug)]
pub enum DrainOutcome {
    Empty,
    Discarded { frames: usize },
    Flushed(FlushOutcome),
}

// Frames of the in-progress segment, streamed to the temporary raw container.
struct Spool {
    path: PathBuf,
    writer: BufWriter<File>,
    width: u32,
    height: u32,
    frames: usize,
}

pub fn segment_file_name(index: u32) -> String {
    format!("segment_{index:04}.mp4")
}

pub fn raw_file_name(index: u32) -> String {
    format!("segment_{index:04}_raw.rgb")
}

/// Accumulates composited frames and hands each full batch to a [`SegmentEncoder`].
///
/// States: `Accumulating -> Flushing -> Accumulating` for every full batch, and
/// `Accumulating -> Closed` on [`SegmentBuffer::drain`].
pub struct SegmentBuffer<E: SegmentEncoder> {
    cfg: SegmentConfig,
    encoder: E,
    state: BufferState,
    spool: Option<Spool>,
    bitrate: Option<Bitrate>,
    index: u32,
}

impl<E: SegmentEncoder> SegmentBuffer<E> {
    pub fn new(cfg: SegmentConfig, encoder: E) -> FoveateResult<Self> {
        if cfg.fps == 0 || cfg.flush_after_secs == 0 {
            return Err(FoveateError::validation(
                "segment fps and flush_after_secs must be non-zero",
            ));
        }
        std::fs::create_dir_all(&cfg.output_dir).with_context(|| {
            format!(
                "failed to create segment directory '{}'",
                cfg.output_dir.display()
            )
        })?;
        if cfg.segment_duration_secs != cfg.flush_after_secs {
            tracing::warn!(
                segment_duration_secs = cfg.segment_duration_secs,
                flush_after_secs = cfg.flush_after_secs,
                "segments are flushed every flush_after_secs, not segment_duration_secs"
            );
        }
        Ok(Self {
            cfg,
            encoder,
            state: BufferState::Accumulating,
            spool: None,
            bitrate: None,
            index: 0,
        })
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Index the next written segment will get.
    pub fn segment_index(&self) -> u32 {
        self.index
    }

    pub fn buffered_frames(&self) -> usize {
        self.spool.as_ref().map_or(0, |s| s.frames)
    }

    pub fn threshold(&self) -> usize {
        self.cfg.flush_threshold_frames()
    }

    pub fn bitrate(&self) -> Option<Bitrate> {
        self.bitrate
    }

    pub fn output_dir(&self) -> &Path {
        &self.cfg.output_dir
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn encoder_mut(&mut self) -> &mut E {
        &mut self.encoder
    }

    /// Buffers one frame; flushes once the batch reaches the threshold.
    ///
    /// An `Err` means the frame could not be buffered at all (closed buffer, size change,
    /// spool I/O). Encode failures are reported as `Flushed(Dropped { .. })`.
    pub fn append(&mut self, frame: &Frame, bitrate: Bitrate) -> FoveateResult<AppendOutcome> {
        if self.state == BufferState::Closed {
            return Err(FoveateError::validation("segment buffer is closed"));
        }
        if frame.data.len() != Frame::byte_len(frame.width, frame.height) {
            return Err(FoveateError::validation(
                "frame.data size mismatch with width*height*3",
            ));
        }

        if self.spool.is_none() {
            self.spool = Some(self.open_spool(frame.width, frame.height)?);
        }
        let Some(spool) = self.spool.as_mut() else {
            return Err(FoveateError::validation("segment spool missing (unexpected)"));
        };
        if frame.width != spool.width || frame.height != spool.height {
            return Err(FoveateError::ShapeMismatch {
                what: "appended frame",
                want_w: spool.width,
                want_h: spool.height,
                got_w: frame.width,
                got_h: frame.height,
            });
        }
        if let Err(e) = spool.writer.write_all(&frame.data) {
            // The spool now holds a torn frame; nothing in it can be encoded.
            let err = anyhow::Error::new(e)
                .context(format!("write frame to '{}'", spool.path.display()));
            let lost = self.discard_spool();
            tracing::error!(lost, "segment spool write failed, buffered frames discarded");
            return Err(err.into());
        }
        spool.frames += 1;
        let frames = spool.frames;
        self.bitrate = Some(bitrate);

        if frames >= self.threshold()
            && let Some(outcome) = self.flush()
        {
            return Ok(AppendOutcome::Flushed(outcome));
        }
        Ok(AppendOutcome::Buffered { frames })
    }

    /// Encodes whatever is buffered. `None` when nothing is buffered.
    pub fn flush(&mut self) -> Option<FlushOutcome> {
        let spool = self.spool.take()?;
        let bitrate = self.bitrate.unwrap_or(Bitrate::kbps(0));
        let index = self.index;
        let frames = spool.frames;
        let prev_state = self.state;
        self.state = BufferState::Flushing;

        let raw_path = spool.path.clone();
        let out_path = self.cfg.output_dir.join(segment_file_name(index));
        let result = finish_spool(spool, self.cfg.fps).and_then(|raw| {
            tracing::debug!(index, frames, raw = %raw.path.display(), "raw segment written");
            self.encoder.encode_segment(&raw, bitrate, &out_path)
        });
        remove_raw(&raw_path);

        self.state = if prev_state == BufferState::Closed {
            BufferState::Closed
        } else {
            BufferState::Accumulating
        };

        Some(match result {
            Ok(()) => {
                self.index += 1;
                tracing::info!(index, frames, %bitrate, path = %out_path.display(), "segment written");
                FlushOutcome::Written(SegmentInfo {
                    index,
                    path: out_path,
                    frames,
                    bitrate,
                })
            }
            Err(error) => {
                tracing::error!(index, frames, %error, "segment encode failed, dropping buffered frames");
                FlushOutcome::Dropped {
                    index,
                    frames,
                    error,
                }
            }
        })
    }

    /// End of stream. A short trailing batch is discarded unless
    /// `flush_partial_on_drain` is set. The buffer is closed afterwards.
    pub fn drain(&mut self) -> DrainOutcome {
        if self.state == BufferState::Closed {
            return DrainOutcome::Empty;
        }
        self.state = BufferState::Closed;

        let Some(frames) = self.spool.as_ref().map(|s| s.frames) else {
            return DrainOutcome::Empty;
        };
        if self.cfg.flush_partial_on_drain {
            return match self.flush() {
                Some(outcome) => DrainOutcome::Flushed(outcome),
                None => DrainOutcome::Empty,
            };
        }

        self.discard_spool();
        tracing::warn!(
            frames,
            threshold = self.threshold(),
            "discarding partial trailing segment"
        );
        DrainOutcome::Discarded { frames }
    }

    /// Closes the buffer after a fatal error. Buffered frames are always discarded, even
    /// with `flush_partial_on_drain` set.
    pub fn abort(&mut self) -> DrainOutcome {
        if self.state == BufferState::Closed {
            return DrainOutcome::Empty;
        }
        self.state = BufferState::Closed;
        match self.discard_spool() {
            0 => DrainOutcome::Empty,
            frames => {
                tracing::warn!(frames, "run aborted, discarding buffered frames");
                DrainOutcome::Discarded { frames }
            }
        }
    }

    // Returns how many whole frames were in the spool.
    fn discard_spool(&mut self) -> usize {
        let Some(spool) = self.spool.take() else {
            return 0;
        };
        drop(spool.writer);
        remove_raw(&spool.path);
        spool.frames
    }

    fn open_spool(&self, width: u32, height: u32) -> FoveateResult<Spool> {
        let path = self.cfg.output_dir.join(raw_file_name(self.index));
        let file = File::create(&path)
            .with_context(|| format!("create raw segment '{}'", path.display()))?;
        Ok(Spool {
            path,
            writer: BufWriter::new(file),
            width,
            height,
            frames: 0,
        })
    }
}

impl<E: SegmentEncoder> Drop for SegmentBuffer<E> {
    fn drop(&mut self) {
        self.discard_spool();
    }
}

fn finish_spool(spool: Spool, fps: u32) -> FoveateResult<RawSegment> {
    let Spool {
        path,
        writer,
        width,
        height,
        frames,
    } = spool;
    writer
        .into_inner()
        .map_err(|e| e.into_error())
        .and_then(|f| f.sync_all())
        .with_context(|| format!("finish raw segment '{}'", path.display()))?;
    Ok(RawSegment {
        path,
        width,
        height,
        fps,
        frames,
    })
}

fn remove_raw(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove raw segment");
    }
}
