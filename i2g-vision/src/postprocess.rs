//! Randomized mask refinement: morphology, elastic warp and blur.

use imageproc::distance_transform::Norm;
use imageproc::{filter, morphology};
use ndarray::Array2;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::mask::{self, Mask};

/// Kernel size range for erosion.
pub const ERODE_KSIZE: (u32, u32) = (1, 21);
/// Kernel size range for dilation.
pub const DILATE_KSIZE: (u32, u32) = (1, 5);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElasticParams {
    /// Standard deviation of the control-point displacement, in pixels.
    pub sigma: f32,
    /// Control points per axis.
    pub points: usize,
}

impl Default for ElasticParams {
    fn default() -> Self {
        Self {
            sigma: 0.01,
            points: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlurParams {
    pub ksize: usize,
    pub sigma: f32,
}

impl Default for BlurParams {
    fn default() -> Self {
        Self {
            ksize: 15,
            sigma: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Morph {
    Erode(u32),
    Dilate(u32),
}

impl Morph {
    /// Choose erosion or dilation with equal odds. A given `ksize` overrides the
    /// random size; even sizes are bumped to the next odd one.
    pub fn random<R: Rng + ?Sized>(ksize: Option<u32>, rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            let k = ksize.unwrap_or_else(|| rng.gen_range(ERODE_KSIZE.0..=ERODE_KSIZE.1));
            Morph::Erode(make_odd(k))
        } else {
            let k = ksize.unwrap_or_else(|| rng.gen_range(DILATE_KSIZE.0..=DILATE_KSIZE.1));
            Morph::Dilate(make_odd(k))
        }
    }

    pub fn apply(self, mask: &Mask) -> Mask {
        let bin = mask::to_binary(mask);
        let out = match self {
            Morph::Erode(k) => morphology::erode(&bin, Norm::LInf, radius(k)),
            Morph::Dilate(k) => morphology::dilate(&bin, Norm::LInf, radius(k)),
        };
        mask::from_gray(&out)
    }
}

fn make_odd(k: u32) -> u32 {
    if k % 2 == 0 {
        k + 1
    } else {
        k
    }
}

/// Chebyshev radius of a square `k x k` kernel.
fn radius(k: u32) -> u8 {
    (k.saturating_sub(1) / 2).min(u8::MAX as u32) as u8
}

pub fn random_erode_dilate<R: Rng + ?Sized>(mask: &Mask, ksize: Option<u32>, rng: &mut R) -> Mask {
    let op = Morph::random(ksize, rng);
    log::trace!("mask morphology {:?}", op);
    op.apply(mask)
}

/// Warp the mask with a smooth random displacement field.
///
/// Displacements are drawn on a `points x points` grid spanning the image,
/// interpolated bilinearly to every pixel, and the mask is resampled at the
/// displaced positions.
pub fn elastic_deform<R: Rng + ?Sized>(mask: &Mask, params: &ElasticParams, rng: &mut R) -> Mask {
    let (h, w) = mask.dim();
    if h == 0 || w == 0 {
        return mask.clone();
    }
    let n = params.points.max(2);
    let dy = Array2::from_shape_fn((n, n), |_| params.sigma * rng.sample::<f32, _>(StandardNormal));
    let dx = Array2::from_shape_fn((n, n), |_| params.sigma * rng.sample::<f32, _>(StandardNormal));

    let gy = (n - 1) as f32 / (h.max(2) - 1) as f32;
    let gx = (n - 1) as f32 / (w.max(2) - 1) as f32;

    Array2::from_shape_fn((h, w), |(y, x)| {
        let cy = y as f32 * gy;
        let cx = x as f32 * gx;
        let sy = y as f32 + mask::sample_bilinear(&dy, cx, cy);
        let sx = x as f32 + mask::sample_bilinear(&dx, cx, cy);
        mask::sample_bilinear(mask, sx, sy).clamp(0.0, 1.0)
    })
}

pub fn gaussian_kernel(ksize: usize, sigma: f32) -> Vec<f32> {
    let ksize = ksize.max(1);
    let c = (ksize / 2) as f32;
    let mut k: Vec<f32> = (0..ksize)
        .map(|i| {
            let d = i as f32 - c;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = k.iter().sum();
    k.iter_mut().for_each(|v| *v /= sum);
    k
}

/// Gaussian blur with a fixed `ksize x ksize` kernel. Border pixels are
/// extended outwards.
pub fn gaussian_blur(mask: &Mask, params: &BlurParams) -> Mask {
    let kernel = gaussian_kernel(params.ksize, params.sigma);
    let blurred = filter::separable_filter_equal(&mask::to_image(mask), &kernel);
    mask::from_image(&blurred).mapv(|v| v.clamp(0.0, 1.0))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerturbParams {
    pub elastic: ElasticParams,
    pub blur: BlurParams,
}

/// Full refinement chain: random erosion or dilation, elastic warp, blur.
pub fn perturb<R: Rng + ?Sized>(mask: &Mask, params: &PerturbParams, rng: &mut R) -> Mask {
    let m = random_erode_dilate(mask, None, rng);
    let m = elastic_deform(&m, &params.elastic, rng);
    gaussian_blur(&m, &params.blur)
}
