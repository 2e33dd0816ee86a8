use std::io::Cursor;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, ImageFormat, Luma, Pixel, Rgb, RgbImage};
use imageproc::filter;
use ndarray::s;
use rand::Rng;

use crate::mask::Mask;

/// Encode as JPEG at `quality` and decode again.
pub fn jpeg_roundtrip(img: &RgbImage, quality: u8) -> Result<RgbImage> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(img)
        .context("encoding jpeg")?;
    let decoded = image::load(Cursor::new(buf), ImageFormat::Jpeg).context("decoding jpeg")?;
    Ok(decoded.to_rgb8())
}

/// JPEG round trip at a quality drawn uniformly from `min..=max`.
pub fn random_jpeg<R: Rng + ?Sized>(img: &RgbImage, min: u8, max: u8, rng: &mut R) -> Result<RgbImage> {
    let quality = rng.gen_range(min.min(max)..=max.max(min));
    log::trace!("jpeg quality {}", quality);
    jpeg_roundtrip(img, quality)
}

pub fn flip_mask(mask: &Mask) -> Mask {
    mask.slice(s![.., ..;-1]).to_owned()
}

/// Mirror an image and its mask together.
pub fn flip_pair(img: &RgbImage, mask: &Mask) -> (RgbImage, Mask) {
    (imageops::flip_horizontal(img), flip_mask(mask))
}

pub fn resize_exact(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    imageops::resize(img, width, height, FilterType::Triangle)
}

/// Scale so the shorter side equals `size`, keeping the aspect ratio.
pub fn resize_shorter<P>(
    img: &ImageBuffer<P, Vec<P::Subpixel>>,
    size: u32,
    filter: FilterType,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let (w, h) = img.dimensions();
    let (nw, nh) = if w <= h {
        (size, ((h as u64 * size as u64) / w.max(1) as u64) as u32)
    } else {
        (((w as u64 * size as u64) / h.max(1) as u64) as u32, size)
    };
    if (nw, nh) == (w, h) {
        return img.clone();
    }
    imageops::resize(img, nw.max(1), nh.max(1), filter)
}

/// Crop a centered `size x size` window; pads with black when the image is smaller.
pub fn center_crop<P>(img: &ImageBuffer<P, Vec<P::Subpixel>>, size: u32) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let (w, h) = img.dimensions();
    if (w, h) == (size, size) {
        return img.clone();
    }
    let mut out = ImageBuffer::new(size, size);
    let left = (w as i64 - size as i64) / 2;
    let top = (h as i64 - size as i64) / 2;
    imageops::replace(&mut out, img, -left, -top);
    out
}

/// Box blur with a `ksize x ksize` kernel; even sizes grow to the next odd one.
pub fn box_blur(img: &RgbImage, ksize: u32) -> RgbImage {
    let radius = ksize / 2;
    if radius == 0 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let planes: Vec<GrayImage> = (0..3)
        .map(|c| {
            let plane = GrayImage::from_fn(w, h, |x, y| Luma([img.get_pixel(x, y)[c]]));
            filter::box_filter(&plane, radius, radius)
        })
        .collect();
    RgbImage::from_fn(w, h, |x, y| Rgb([0, 1, 2].map(|c| planes[c].get_pixel(x, y)[0])))
}

/// `out = 255 * (in / 255) ^ gamma`
pub fn adjust_gamma(img: &RgbImage, gamma: f32) -> RgbImage {
    let table: Vec<u8> = (0..256)
        .map(|v| ((v as f32 / 255.0).powf(gamma) * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();
    let mut out = img.clone();
    for px in out.pixels_mut() {
        for c in px.0.iter_mut() {
            *c = table[*c as usize];
        }
    }
    out
}
