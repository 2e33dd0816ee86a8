//! Single-channel float masks.
//!
//! A [`Mask`] is indexed `[[y, x]]` and holds values in `[0, 1]`.

use image::{GrayImage, ImageBuffer, Luma};
use ndarray::Array2;

pub type Mask = Array2<f32>;

/// Float image form of a [`Mask`], for `imageproc` filters.
pub type MaskImage = ImageBuffer<Luma<f32>, Vec<f32>>;

pub fn dimensions(mask: &Mask) -> (u32, u32) {
    let (h, w) = mask.dim();
    (w as u32, h as u32)
}

pub fn from_gray(img: &GrayImage) -> Mask {
    let (w, h) = img.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
    })
}

pub fn to_gray(mask: &Mask) -> GrayImage {
    let (w, h) = dimensions(mask);
    GrayImage::from_fn(w, h, |x, y| {
        let v = mask[[y as usize, x as usize]].clamp(0.0, 1.0);
        Luma([(v * 255.0).round() as u8])
    })
}

pub fn to_image(mask: &Mask) -> MaskImage {
    let (w, h) = dimensions(mask);
    MaskImage::from_fn(w, h, |x, y| Luma([mask[[y as usize, x as usize]]]))
}

pub fn from_image(img: &MaskImage) -> Mask {
    let (w, h) = img.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| img.get_pixel(x as u32, y as u32)[0])
}

/// 255 where the mask is fully set, 0 elsewhere.
pub fn to_binary(mask: &Mask) -> GrayImage {
    let (w, h) = dimensions(mask);
    GrayImage::from_fn(w, h, |x, y| {
        if mask[[y as usize, x as usize]] >= 1.0 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Bilinear resampling with pixel-center alignment and edge clamping.
pub fn resize(mask: &Mask, width: u32, height: u32) -> Mask {
    let (src_h, src_w) = mask.dim();
    if src_h == height as usize && src_w == width as usize {
        return mask.clone();
    }
    let sx = src_w as f32 / width as f32;
    let sy = src_h as f32 / height as f32;
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        let fx = (x as f32 + 0.5) * sx - 0.5;
        let fy = (y as f32 + 0.5) * sy - 0.5;
        sample_bilinear(mask, fx, fy)
    })
}

/// Sample at a fractional position, clamping coordinates to the border.
pub fn sample_bilinear(mask: &Mask, x: f32, y: f32) -> f32 {
    let (h, w) = mask.dim();
    if h == 0 || w == 0 {
        return 0.0;
    }
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = mask[[y0, x0]] * (1.0 - fx) + mask[[y0, x1]] * fx;
    let bottom = mask[[y1, x0]] * (1.0 - fx) + mask[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}
