//! Datapoint to tensor conversion used when feeding a training loop.

use std::fmt;

use i2g_vision::augment;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use ndarray::Array3;

use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    ResizeShorter(u32),
    CenterCrop(u32),
    Flip,
    Jpeg(u8),
    Blur(u32),
    Gamma(f32),
}

/// An ordered list of image steps ending in a CHW float tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPipeline {
    steps: Vec<Step>,
}

impl TransformPipeline {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Image pipeline. Training crops to `fine_size`; validation keeps
    /// `load_size` and appends the enabled test-time augmentations.
    pub fn image(cfg: &Config, for_val: bool) -> Self {
        let mut steps = vec![Step::ResizeShorter(cfg.load_size)];
        if for_val {
            let t = &cfg.transform;
            steps.push(Step::CenterCrop(cfg.load_size));
            if t.test_flip {
                steps.push(Step::Flip);
            }
            if t.test_compression {
                steps.push(Step::Jpeg(t.compression));
            }
            if t.test_blur {
                steps.push(Step::Blur(t.blur));
            }
            if t.test_gamma {
                steps.push(Step::Gamma(t.gamma as f32 / 100.0));
            }
        } else {
            steps.push(Step::CenterCrop(cfg.fine_size));
        }
        let pipeline = Self::new(steps);
        log::info!("image transform: {}", pipeline);
        pipeline
    }

    pub fn mask(cfg: &Config) -> Self {
        Self::new(vec![
            Step::ResizeShorter(cfg.load_size),
            Step::CenterCrop(cfg.fine_size),
        ])
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn apply_rgb(&self, img: &RgbImage) -> Result<RgbImage> {
        let mut img = img.clone();
        for step in &self.steps {
            img = match *step {
                Step::ResizeShorter(size) => augment::resize_shorter(&img, size, FilterType::Lanczos3),
                Step::CenterCrop(size) => augment::center_crop(&img, size),
                Step::Flip => imageops::flip_horizontal(&img),
                Step::Jpeg(quality) => augment::jpeg_roundtrip(&img, quality).map_err(Error::Stage)?,
                Step::Blur(ksize) => augment::box_blur(&img, ksize),
                Step::Gamma(gamma) => augment::adjust_gamma(&img, gamma),
            };
        }
        Ok(img)
    }

    /// Geometric steps only; photometric steps do not apply to masks.
    pub fn apply_gray(&self, img: &GrayImage) -> GrayImage {
        let mut img = img.clone();
        for step in &self.steps {
            img = match *step {
                Step::ResizeShorter(size) => augment::resize_shorter(&img, size, FilterType::Lanczos3),
                Step::CenterCrop(size) => augment::center_crop(&img, size),
                Step::Flip => imageops::flip_horizontal(&img),
                Step::Jpeg(_) | Step::Blur(_) | Step::Gamma(_) => img,
            };
        }
        img
    }
}

impl fmt::Display for TransformPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.steps.iter().map(|s| format!("{:?}", s)).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

pub fn rgb_to_tensor(img: &RgbImage) -> Array3<f32> {
    let (w, h) = img.dimensions();
    Array3::from_shape_fn((3, h as usize, w as usize), |(c, y, x)| {
        img.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

pub fn gray_to_tensor(img: &GrayImage) -> Array3<f32> {
    let (w, h) = img.dimensions();
    Array3::from_shape_fn((1, h as usize, w as usize), |(_, y, x)| {
        img.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
    })
}
