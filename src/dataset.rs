//! Labeled sample generation.
//!
//! Each request flips a coin between a real face, returned as-is, and a
//! forgery made by blending the closest-looking face from another session
//! onto it. The returned mask marks untouched pixels with 1.

use std::path::{Path, PathBuf};

use i2g_vision::{augment, blend, hull, mask, postprocess, HullKind, Mask};
use image::RgbImage;
use log::debug;
use ndarray::Array3;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::cache::{self, LandmarkCache};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::matcher::{self, SearchParams};
use crate::transform::{self, TransformPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Forged = 0,
    Real = 1,
}

impl Label {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Where a datapoint came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub id: String,
    pub donor: Option<String>,
    pub hull: Option<HullKind>,
}

#[derive(Debug, Clone)]
pub struct Datapoint {
    pub image: RgbImage,
    /// 1 where the pixel is authentic, 0 where it was replaced.
    pub mask: Mask,
    pub label: Label,
    pub provenance: Provenance,
}

/// Tensor form of a [`Datapoint`].
#[derive(Debug, Clone)]
pub struct Sample {
    pub img: Array3<f32>,
    pub mask: Array3<f32>,
    pub label: u8,
}

/// Image and mask pipelines applied by [`I2gDataset::sample`].
#[derive(Debug, Clone)]
pub struct SamplePipelines {
    pub image: TransformPipeline,
    pub mask: TransformPipeline,
}

impl SamplePipelines {
    pub fn new(cfg: &Config, for_val: bool) -> Self {
        Self {
            image: TransformPipeline::image(cfg, for_val),
            mask: TransformPipeline::mask(cfg),
        }
    }
}

/// Blended-face dataset over one directory of real faces.
///
/// Holds the landmark cache read-only, so one instance can serve several
/// worker threads at once.
pub struct I2gDataset {
    config: Config,
    root: PathBuf,
    cache: LandmarkCache,
    ids: Vec<String>,
}

impl I2gDataset {
    /// The id list is the cache's, subsampled to `max_dataset_size` if larger.
    pub fn new<R: Rng + ?Sized>(
        config: Config,
        root: impl Into<PathBuf>,
        cache: LandmarkCache,
        rng: &mut R,
    ) -> Self {
        let mut ids = cache.ids().to_vec();
        if let Some(max) = config.max_dataset_size {
            if ids.len() > max {
                ids = ids.choose_multiple(rng, max).cloned().collect();
            }
        }
        debug!("dataset of {} faces out of {} cached", ids.len(), cache.len());
        Self {
            config,
            root: root.into(),
            cache,
            ids,
        }
    }

    /// Build the landmark cache of `root` if needed, load it, and wrap it.
    pub fn open<D>(config: Config, root: &Path, detector: &mut D) -> Result<Self>
    where
        D: i2g_vision::LandmarkDetector + ?Sized,
    {
        let path = cache::ensure_built(root, detector)?;
        let cache = LandmarkCache::load(&path)?;
        Ok(Self::new(config, root, cache, &mut rand::thread_rng()))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn cache(&self) -> &LandmarkCache {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Datapoint for `index`, drawn with this thread's random generator.
    pub fn get(&self, index: usize) -> Result<Datapoint> {
        self.get_with_rng(index, &mut rand::thread_rng())
    }

    pub fn get_with_rng<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Datapoint> {
        let id = self.ids.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.ids.len(),
        })?;
        let size = self.config.load_size;

        let (mut image, mut mask, label, provenance) = if rng.gen_bool(0.5) {
            let image = augment::resize_exact(&self.load_image(id)?, size, size);
            let mask = Mask::ones((size as usize, size as usize));
            let provenance = Provenance {
                id: id.clone(),
                donor: None,
                hull: None,
            };
            (image, mask, Label::Real, provenance)
        } else {
            let (image, replaced, provenance) = self.blended_face(id, rng)?;
            let image = augment::resize_exact(&image, size, size);
            let mask = mask::resize(&replaced, size, size).mapv(|v| (1.0 - v).clamp(0.0, 1.0));
            (image, mask, Label::Forged, provenance)
        };

        if rng.gen_bool(0.5) {
            let (lo, hi) = self.config.jpeg_quality;
            image = augment::random_jpeg(&image, lo, hi, rng).map_err(Error::Stage)?;
        }
        if rng.gen_bool(0.5) {
            (image, mask) = augment::flip_pair(&image, &mask);
        }

        debug!(
            "sample {} {:?}: {} donor={:?} hull={:?}",
            index, label, provenance.id, provenance.donor, provenance.hull
        );
        Ok(Datapoint {
            image,
            mask,
            label,
            provenance,
        })
    }

    /// Datapoint for `index` run through the tensor pipelines.
    pub fn sample(&self, index: usize, pipelines: &SamplePipelines) -> Result<Sample> {
        let dp = self.get(index)?;
        let img = pipelines.image.apply_rgb(&dp.image)?;
        let mask_img = pipelines.mask.apply_gray(&mask::to_gray(&dp.mask));
        Ok(Sample {
            img: transform::rgb_to_tensor(&img),
            mask: transform::gray_to_tensor(&mask_img),
            label: dp.label.as_u8(),
        })
    }

    fn load_image(&self, id: &str) -> Result<RgbImage> {
        Ok(image::open(self.root.join(id))?.to_rgb8())
    }

    /// Blend a donor face onto `id`. Returns the composite at the target's
    /// resolution and the replaced-region mask (1 = replaced).
    fn blended_face<R: Rng + ?Sized>(&self, id: &str, rng: &mut R) -> Result<(RgbImage, Mask, Provenance)> {
        let target = self.load_image(id)?;
        let landmarks = self
            .cache
            .get(id)
            .ok_or_else(|| Error::MissingLandmarks(id.to_string()))?;

        let params = SearchParams {
            sample_num: self.config.sample_num,
            separator: self.config.session_separator,
        };
        let donor_id = matcher::find_best_match_relaxed(id, landmarks, &self.ids, &self.cache, &params, rng)?;
        let (w, h) = target.dimensions();
        let donor = augment::resize_exact(&self.load_image(&donor_id)?, w, h);

        let (kind, face_mask) = hull::synthesize(landmarks, w, h, rng);

        let donor = blend::color_transfer(&target, &donor, &face_mask).map_err(Error::Stage)?;
        let blended = blend::blend(&donor, &target, &face_mask, self.config.feather).map_err(Error::Stage)?;

        // no erosion or dilation on this path, only warp and blur
        let face_mask = postprocess::elastic_deform(&face_mask, &self.config.elastic, rng);
        let face_mask = postprocess::gaussian_blur(&face_mask, &self.config.blur);

        let provenance = Provenance {
            id: id.to_string(),
            donor: Some(donor_id),
            hull: Some(kind),
        };
        Ok((blended, face_mask, provenance))
    }
}
