use std::ops::Range;

use anyhow::{ensure, Result};
use image::RgbImage;
use imageproc::point::Point;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Point count of the iBUG 68-point layout the region tables below refer to.
pub const POINTS_68: usize = 68;

/// Index ranges of the 68-point layout, seen from the viewer.
pub mod region {
    use std::ops::Range;

    pub const JAW: Range<usize> = 0..17;
    pub const RIGHT_EYEBROW: Range<usize> = 17..22;
    pub const LEFT_EYEBROW: Range<usize> = 22..27;
    pub const NOSE_RIDGE: Range<usize> = 27..31;
    pub const NOSTRILS: Range<usize> = 31..36;
    pub const RIGHT_EYE: Range<usize> = 36..42;
    pub const LEFT_EYE: Range<usize> = 42..48;
    pub const MOUTH: Range<usize> = 48..68;
}

/// Facial landmarks of one image, an `N x 2` array of `(x, y)` pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    pub points: Array2<f32>,
}

impl LandmarkSet {
    pub fn new(points: Array2<f32>) -> Result<Self> {
        ensure!(
            points.ncols() == 2,
            "landmarks must be N x 2, got {:?}",
            points.dim()
        );
        Ok(Self { points })
    }

    pub fn from_points(points: &[(f32, f32)]) -> Self {
        let mut arr = Array2::zeros((points.len(), 2));
        for (i, &(x, y)) in points.iter().enumerate() {
            arr[[i, 0]] = x;
            arr[[i, 1]] = y;
        }
        Self { points: arr }
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    pub fn shape(&self) -> (usize, usize) {
        self.points.dim()
    }

    pub fn point(&self, i: usize) -> (f32, f32) {
        (self.points[[i, 0]], self.points[[i, 1]])
    }

    /// Points truncated to integer pixels, the form hulls are rasterized from.
    pub fn pixel_points(&self) -> Vec<Point<i32>> {
        self.points
            .rows()
            .into_iter()
            .map(|r| Point::new(r[0] as i32, r[1] as i32))
            .collect()
    }

    /// Schematic 68-point face laid out inside the box `(x, y, w, h)`.
    ///
    /// Not a learned mean shape; it only keeps every region in its usual
    /// place so that region hulls are non-degenerate.
    pub fn template_68(x: f32, y: f32, w: f32, h: f32) -> Self {
        use std::f32::consts::PI;

        let mut pts: Vec<(f32, f32)> = Vec::with_capacity(POINTS_68);

        // jaw: lower half ellipse from the right temple, through the chin, to the left temple
        for i in 0..17 {
            let t = PI - i as f32 * PI / 16.0;
            pts.push((0.5 + 0.5 * t.cos(), 0.2 + 0.8 * t.sin()));
        }
        // eyebrows arch slightly
        for i in 0..5 {
            let u = i as f32 / 4.0;
            pts.push((0.12 + 0.30 * u, 0.20 - 0.05 * (u * PI).sin()));
        }
        for i in 0..5 {
            let u = i as f32 / 4.0;
            pts.push((0.58 + 0.30 * u, 0.20 - 0.05 * (u * PI).sin()));
        }
        for i in 0..4 {
            pts.push((0.5, 0.30 + 0.08 * i as f32));
        }
        for i in 0..5 {
            let u = i as f32 / 4.0;
            pts.push((0.40 + 0.20 * u, 0.62 + 0.02 * (u * PI).sin()));
        }
        for (cx, cy) in [(0.30, 0.36), (0.70, 0.36)] {
            for i in 0..6 {
                let t = PI + i as f32 * PI / 3.0;
                pts.push((cx + 0.09 * t.cos(), cy + 0.03 * t.sin()));
            }
        }
        for i in 0..12 {
            let t = PI + i as f32 * PI / 6.0;
            pts.push((0.5 + 0.17 * t.cos(), 0.80 + 0.07 * t.sin()));
        }
        for i in 0..8 {
            let t = PI + i as f32 * PI / 4.0;
            pts.push((0.5 + 0.10 * t.cos(), 0.80 + 0.03 * t.sin()));
        }

        let scaled: Vec<(f32, f32)> = pts
            .into_iter()
            .map(|(u, v)| (x + u * w, y + v * h))
            .collect();
        Self::from_points(&scaled)
    }
}

/// Gather the points of several index ranges into one list.
pub fn gather(points: &[Point<i32>], spans: &[Range<usize>]) -> Vec<Point<i32>> {
    spans
        .iter()
        .flat_map(|r| points[r.clone()].iter().copied())
        .collect()
}

/// Anything that can locate the landmarks of the face in an image.
///
/// `Ok(None)` means no face was found, which is not an error.
pub trait LandmarkDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>>;
}

impl<F> LandmarkDetector for F
where
    F: FnMut(&RgbImage) -> Result<Option<LandmarkSet>>,
{
    fn detect(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>> {
        self(image)
    }
}
