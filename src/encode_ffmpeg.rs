use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::Context as _;

use crate::{
    composite::Bitrate,
    config::CompositeConfig,
    core::Canvas,
    error::{FoveateError, FoveateResult},
};

/// A finished temporary raw container: packed rgb24 frames back to back.
#[derive(Clone, Debug)]
pub struct RawSegment {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frames: usize,
}

/// Turns a raw segment into one playable, independently decodable segment file.
pub trait SegmentEncoder {
    fn encode_segment(
        &mut self,
        raw: &RawSegment,
        bitrate: Bitrate,
        out_path: &Path,
    ) -> FoveateResult<()>;
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> FoveateResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// H.264 segment encoding through the system `ffmpeg` binary.
#[derive(Clone, Debug)]
pub struct FfmpegSegmentEncoder {
    pub preset: String,
    /// Rate-control buffer passed as `-bufsize`.
    pub bufsize: String,
}

impl FfmpegSegmentEncoder {
    pub fn new(bufsize: impl Into<String>) -> Self {
        Self {
            preset: "fast".to_string(),
            bufsize: bufsize.into(),
        }
    }
}

impl SegmentEncoder for FfmpegSegmentEncoder {
    fn encode_segment(
        &mut self,
        raw: &RawSegment,
        bitrate: Bitrate,
        out_path: &Path,
    ) -> FoveateResult<()> {
        if raw.width == 0 || raw.height == 0 || raw.fps == 0 {
            return Err(FoveateError::validation(
                "raw segment width/height/fps must be non-zero",
            ));
        }
        if !raw.width.is_multiple_of(2) || !raw.height.is_multiple_of(2) {
            return Err(FoveateError::validation(
                "segment width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        ensure_parent_dir(out_path)?;
        if !is_ffmpeg_on_path() {
            return Err(FoveateError::encode(
                "ffmpeg is required for segment encoding, but was not found on PATH",
            ));
        }

        let bitrate = bitrate.to_string();
        let output = Command::new("ffmpeg")
            .args([
                "-y",
                "-loglevel",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", raw.width, raw.height),
                "-r",
                &raw.fps.to_string(),
                "-i",
            ])
            .arg(&raw.path)
            .args([
                "-an",
                "-c:v",
                "libx264",
                "-preset",
                &self.preset,
                "-b:v",
                &bitrate,
                "-maxrate",
                &bitrate,
                "-bufsize",
                &self.bufsize,
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ])
            .arg(out_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                FoveateError::encode(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FoveateError::encode(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Output paths of the three pre-encoded tiers.
#[derive(Clone, Debug)]
pub struct TierFiles {
    pub low: PathBuf,
    pub med: PathBuf,
    pub high: PathBuf,
}

impl TierFiles {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            low: dir.join("low_res.mp4"),
            med: dir.join("med_res.mp4"),
            high: dir.join("high_res.mp4"),
        }
    }
}

/// Encodes `input` once per bitrate tier, scaled to `canvas`, into `out_dir`.
pub fn encode_tiers(
    input: &Path,
    canvas: Canvas,
    tiers: &CompositeConfig,
    out_dir: &Path,
) -> FoveateResult<TierFiles> {
    if !is_ffmpeg_on_path() {
        return Err(FoveateError::encode(
            "ffmpeg is required for tier encoding, but was not found on PATH",
        ));
    }
    let files = TierFiles::in_dir(out_dir);
    ensure_parent_dir(&files.low)?;

    for (tier, out) in [
        (&tiers.low_tier, &files.low),
        (&tiers.med_tier, &files.med),
        (&tiers.high_tier, &files.high),
    ] {
        let bitrate = tier.bitrate.to_string();
        tracing::info!(tier = %tier.name, %bitrate, out = %out.display(), "encoding tier");
        let output = Command::new("ffmpeg")
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(input)
            .args([
                "-vf",
                &format!("scale={}:{}", canvas.width, canvas.height),
                "-b:v",
                &bitrate,
                "-maxrate",
                &bitrate,
                "-bufsize",
                "2M",
                "-c:v",
                "libx264",
                "-preset",
                "medium",
                "-tune",
                "film",
            ])
            .arg(out)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| FoveateError::encode(format!("failed to spawn ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(FoveateError::encode(format!(
                "ffmpeg failed encoding {} tier: {}",
                tier.name,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_dimensions_are_rejected_before_spawning() {
        let raw = RawSegment {
            path: PathBuf::from("target/encode_tests/odd_raw.rgb"),
            width: 11,
            height: 10,
            fps: 30,
            frames: 1,
        };
        let err = FfmpegSegmentEncoder::new("3M")
            .encode_segment(&raw, Bitrate::kbps(984), Path::new("target/encode_tests/odd.mp4"))
            .unwrap_err();
        assert!(matches!(err, FoveateError::Validation(_)));
    }

    #[test]
    fn zero_fps_is_rejected() {
        let raw = RawSegment {
            path: PathBuf::from("target/encode_tests/zero_raw.rgb"),
            width: 10,
            height: 10,
            fps: 0,
            frames: 1,
        };
        assert!(
            FfmpegSegmentEncoder::new("3M")
                .encode_segment(&raw, Bitrate::kbps(700), Path::new("target/encode_tests/z.mp4"))
                .is_err()
        );
    }

    #[test]
    fn tier_files_use_fixed_names() {
        let files = TierFiles::in_dir(Path::new("h264_outputs"));
        assert_eq!(files.low, PathBuf::from("h264_outputs/low_res.mp4"));
        assert_eq!(files.high, PathBuf::from("h264_outputs/high_res.mp4"));
    }
}
