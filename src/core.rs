use std::path::Path;

use anyhow::Context as _;

use crate::error::{FoveateError, FoveateResult};

/// Integer pixel coordinate. Also used for velocity vectors.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Point2D {
    pub x: i32,
    pub y: i32,
}

impl Point2D {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point2D) -> f64 {
        (self - other).norm()
    }

    pub fn norm(self) -> f64 {
        f64::from(self.x).hypot(f64::from(self.y))
    }

    pub fn is_zero(self) -> bool {
        self.x == 0 && self.y == 0
    }
}

impl std::ops::Sub for Point2D {
    type Output = Point2D;

    fn sub(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Add for Point2D {
    type Output = Point2D;

    fn add(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl From<(i32, i32)> for Point2D {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> FoveateResult<Self> {
        if width == 0 || height == 0 {
            return Err(FoveateError::validation("canvas width/height must be non-zero"));
        }
        Ok(Self { width, height })
    }

    pub fn area(self) -> f64 {
        f64::from(self.width) * f64::from(self.height)
    }
}

/// Packed RGB8 raster, row-major, 3 bytes per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::CHANNELS
    }

    pub fn new(width: u32, height: u32) -> Self {
        Self::solid(width, height, [0, 0, 0])
    }

    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(Self::byte_len(width, height));
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> FoveateResult<Self> {
        let expected = Self::byte_len(width, height);
        if data.len() != expected {
            return Err(FoveateError::validation(format!(
                "frame data is {} bytes, expected {expected} for {width}x{height} rgb8",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    pub fn to_image(&self) -> FoveateResult<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            FoveateError::validation("frame.data size mismatch with width*height*3")
        })
    }

    pub fn save_png(&self, path: &Path) -> FoveateResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create snapshot dir '{}'", parent.display()))?;
        }
        self.to_image()?
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }
}

/// One timestamp's worth of low/medium/high tier frames.
#[derive(Clone, Debug)]
pub struct FrameTriple {
    pub low: Frame,
    pub med: Frame,
    pub high: Frame,
}

impl FrameTriple {
    /// Fails with `ShapeMismatch` unless all three frames share dimensions.
    pub fn check_shapes(&self) -> FoveateResult<Canvas> {
        let want = self.low.canvas();
        for (what, f) in [("medium frame", &self.med), ("high frame", &self.high)] {
            if f.width != want.width || f.height != want.height {
                return Err(FoveateError::ShapeMismatch {
                    what,
                    want_w: want.width,
                    want_h: want.height,
                    got_w: f.width,
                    got_h: f.height,
                });
            }
        }
        for f in [&self.low, &self.med, &self.high] {
            if f.data.len() != Frame::byte_len(f.width, f.height) {
                return Err(FoveateError::validation(
                    "frame.data size mismatch with width*height*3",
                ));
            }
        }
        Ok(want)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_distance_is_euclidean() {
        assert_eq!(Point2D::new(0, 0).distance(Point2D::new(3, 4)), 5.0);
        assert!(Point2D::new(0, 0).is_zero());
    }

    #[test]
    fn frame_from_raw_checks_len() {
        assert!(Frame::from_raw(2, 2, vec![0; 12]).is_ok());
        assert!(Frame::from_raw(2, 2, vec![0; 11]).is_err());
    }

    #[test]
    fn pixel_reads_rgb_and_rejects_out_of_bounds() {
        let f = Frame::solid(3, 2, [9, 8, 7]);
        assert_eq!(f.pixel(2, 1), Some([9, 8, 7]));
        assert_eq!(f.pixel(3, 0), None);
    }

    #[test]
    fn triple_shape_mismatch_names_offender() {
        let t = FrameTriple {
            low: Frame::new(4, 4),
            med: Frame::new(4, 4),
            high: Frame::new(4, 2),
        };
        match t.check_shapes() {
            Err(FoveateError::ShapeMismatch { what, got_h, .. }) => {
                assert_eq!(what, "high frame");
                assert_eq!(got_h, 2);
            }
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }
}
