use std::{f64::consts::PI, fmt, str::FromStr};

use crate::{
    config::CompositeConfig,
    core::{Canvas, Frame, FrameTriple, Point2D},
    error::{FoveateError, FoveateResult},
};

/// Video bitrate in kbit/s, written as `"<kbps>k"` on the ffmpeg command line.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Bitrate(u32);

impl Bitrate {
    pub const fn kbps(kbps: u32) -> Self {
        Self(kbps)
    }

    pub fn as_kbps(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.0)
    }
}

impl FromStr for Bitrate {
    type Err = FoveateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().strip_suffix('k').ok_or_else(|| {
            FoveateError::validation(format!("bitrate '{s}' must look like '<integer>k'"))
        })?;
        digits
            .parse::<u32>()
            .map(Self)
            .map_err(|e| FoveateError::validation(format!("bitrate '{s}': {e}")))
    }
}

impl TryFrom<String> for Bitrate {
    type Error = FoveateError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Bitrate> for String {
    fn from(b: Bitrate) -> Self {
        b.to_string()
    }
}

/// A named resolution tier and the bitrate it is encoded at.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BitrateTier {
    pub name: String,
    pub bitrate: Bitrate,
}

impl BitrateTier {
    pub fn new(name: impl Into<String>, bitrate: Bitrate) -> Self {
        Self {
            name: name.into(),
            bitrate,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    Low,
    Med,
    High,
}

/// Binary high/medium disk masks centered on the gaze point, clipped to the frame.
/// A pixel is inside a disk when its squared distance to the center is below r².
#[derive(Clone, Debug)]
pub struct RegionMasks {
    pub width: u32,
    pub height: u32,
    pub high: Vec<bool>,
    pub med: Vec<bool>,
}

impl RegionMasks {
    pub fn build(canvas: Canvas, center: Point2D, high_radius: u32, med_radius: u32) -> Self {
        let n = canvas.width as usize * canvas.height as usize;
        let mut high = vec![false; n];
        let mut med = vec![false; n];
        let hr2 = i64::from(high_radius).pow(2);
        let mr2 = i64::from(med_radius).pow(2);
        let (cx, cy) = (i64::from(center.x), i64::from(center.y));

        for y in 0..canvas.height {
            let dy2 = (i64::from(y) - cy).pow(2);
            if dy2 >= hr2 && dy2 >= mr2 {
                continue;
            }
            let row = y as usize * canvas.width as usize;
            for x in 0..canvas.width {
                let d2 = (i64::from(x) - cx).pow(2) + dy2;
                high[row + x as usize] = d2 < hr2;
                med[row + x as usize] = d2 < mr2;
            }
        }

        Self {
            width: canvas.width,
            height: canvas.height,
            high,
            med,
        }
    }

    /// Highest-priority region covering the pixel.
    pub fn region(&self, x: u32, y: u32) -> Region {
        let i = y as usize * self.width as usize + x as usize;
        if self.high[i] {
            Region::High
        } else if self.med[i] {
            Region::Med
        } else {
            Region::Low
        }
    }
}

/// Merges the three resolution tiers around a gaze point by disjoint-priority masking.
#[derive(Clone, Debug)]
pub struct RegionCompositor {
    cfg: CompositeConfig,
}

impl RegionCompositor {
    pub fn new(cfg: CompositeConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &CompositeConfig {
        &self.cfg
    }

    pub fn masks(&self, canvas: Canvas, gaze: Point2D) -> RegionMasks {
        RegionMasks::build(canvas, gaze, self.cfg.high_radius, self.cfg.med_radius)
    }

    /// Each output pixel comes from the high frame inside the high disk, else the medium
    /// frame inside the medium disk, else the low frame. Fails with `ShapeMismatch`
    /// before writing anything if the tiers disagree on dimensions.
    pub fn merge(&self, frames: &FrameTriple, gaze: Point2D) -> FoveateResult<Frame> {
        let canvas = frames.check_shapes()?;
        let masks = self.masks(canvas, gaze);

        let mut data = frames.low.data.clone();
        for (i, px) in data.chunks_exact_mut(Frame::CHANNELS).enumerate() {
            let src = if masks.high[i] {
                &frames.high.data
            } else if masks.med[i] {
                &frames.med.data
            } else {
                continue;
            };
            let o = i * Frame::CHANNELS;
            px.copy_from_slice(&src[o..o + Frame::CHANNELS]);
        }

        Frame::from_raw(canvas.width, canvas.height, data)
    }

    /// Area-weighted average of the tier bitrates.
    ///
    /// Disk areas use `π·r²` without clipping to the frame, so this is an estimate of pixel
    /// coverage rather than an exact count. The result is floored and capped at the high
    /// tier's bitrate.
    pub fn segment_bitrate(&self, width: u32, height: u32) -> FoveateResult<Bitrate> {
        let canvas = Canvas::new(width, height)?;
        let frame_area = canvas.area();
        let high_area = PI * f64::from(self.cfg.high_radius).powi(2);
        let med_area = PI * f64::from(self.cfg.med_radius).powi(2);

        let high_ratio = high_area / frame_area;
        let med_ratio = (med_area - high_area) / frame_area;
        let low_ratio = 1.0 - high_ratio - med_ratio;

        let total = low_ratio * f64::from(self.cfg.low_tier.bitrate.as_kbps())
            + med_ratio * f64::from(self.cfg.med_tier.bitrate.as_kbps())
            + high_ratio * f64::from(self.cfg.high_tier.bitrate.as_kbps());

        let cap = self.cfg.high_tier.bitrate.as_kbps();
        let kbps = (total.max(0.0) as u64).min(u64::from(cap)) as u32;
        Ok(Bitrate::kbps(kbps))
    }
}
