use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array2, Array4};
use ort::{
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
    value::Value,
};

use crate::landmarks::{LandmarkDetector, LandmarkSet};

pub fn session_builder() -> Result<SessionBuilder> {
    #[allow(unused_mut)]
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "cuda")]
    {
        use ort::ep::{self, ExecutionProvider};

        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

/// Landmark regressor backed by an ONNX model.
///
/// The model takes a `[1, 3, S, S]` RGB tensor with values in `[0, 1]` and
/// returns `N * 2` coordinates normalized to the input, `x` before `y`.
/// Images are expected to be face crops, as produced by the frame extraction
/// step, so no separate face box is searched for.
pub struct OnnxLandmarkDetector {
    session: Session,
    input_size: u32,
}

impl OnnxLandmarkDetector {
    pub fn from_file(path: &Path, input_size: u32) -> Result<Self> {
        let session = session_builder()?
            .commit_from_file(path)
            .with_context(|| format!("load landmark model {}", path.display()))?;
        Ok(Self {
            session,
            input_size,
        })
    }

    fn run(&mut self, image: &RgbImage) -> Result<Vec<f32>> {
        let size = self.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

        let pixel_count = (size * size) as usize;
        let mut input_data = vec![0f32; 3 * pixel_count];
        let (r_channel, rest) = input_data.split_at_mut(pixel_count);
        let (g_channel, b_channel) = rest.split_at_mut(pixel_count);
        for (i, px) in resized.pixels().enumerate() {
            r_channel[i] = px[0] as f32 / 255.0;
            g_channel[i] = px[1] as f32 / 255.0;
            b_channel[i] = px[2] as f32 / 255.0;
        }

        let input_array =
            Array4::from_shape_vec((1, 3, size as usize, size as usize), input_data)?;
        let input_tensor = Value::from_array(input_array)?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }
}

impl LandmarkDetector for OnnxLandmarkDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>> {
        let raw = self.run(image).context("running landmark model")?;
        Ok(decode_landmarks(&raw, image.width(), image.height()))
    }
}

/// Scale normalized `x, y` pairs to pixels. `None` when the output cannot be a
/// face: empty, odd length, non-finite, or outside the image.
pub fn decode_landmarks(raw: &[f32], width: u32, height: u32) -> Option<LandmarkSet> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return None;
    }
    if raw.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > 1.0) {
        return None;
    }
    let n = raw.len() / 2;
    let points = Array2::from_shape_fn((n, 2), |(i, j)| {
        let scale = (if j == 0 { width } else { height }) as f32;
        raw[i * 2 + j] * scale
    });
    Some(LandmarkSet { points })
}
