//! On-disk landmark cache.
//!
//! The cache is built once per source directory and stored next to it as
//! `<dir>_landmark`. When that file exists it is reused as-is: images added or
//! changed afterwards are not picked up until the file is deleted.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use i2g_vision::{LandmarkDetector, LandmarkSet};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub const CACHE_SUFFIX: &str = "_landmark";

const IMG_EXTENSIONS: &[&str] = &[
    "jpg", "JPG", "jpeg", "JPEG", "png", "PNG", "ppm", "PPM", "bmp", "BMP",
];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMG_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

/// `<dir>_landmark`, with any trailing separator of `dir` dropped.
pub fn cache_path(dir: &Path) -> PathBuf {
    let mut name = OsString::from(dir.components().as_path().as_os_str());
    name.push(CACHE_SUFFIX);
    PathBuf::from(name)
}

/// Image id of `path` under `root`: the relative path joined with `/`.
pub fn image_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Image files under `dir`, ordered by parent directory and then file name.
pub fn list_images(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_image_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort_by(|a, b| {
        a.parent()
            .cmp(&b.parent())
            .then_with(|| a.file_name().cmp(&b.file_name()))
    });
    files
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    entries: Vec<(String, LandmarkSet)>,
}

/// Run the detector over every image under `dir`, in walk order.
///
/// Images where no face is found, or that fail to decode, are left out.
pub fn build_entries<D>(dir: &Path, detector: &mut D) -> Result<Vec<(String, LandmarkSet)>>
where
    D: LandmarkDetector + ?Sized,
{
    let mut entries = Vec::new();
    for path in list_images(dir) {
        let id = image_id(dir, &path);
        let img = match image::open(&path) {
            Ok(img) => img.to_rgb8(),
            Err(err) => {
                warn!("skipping {}: {}", path.display(), err);
                continue;
            }
        };
        match detector.detect(&img) {
            Ok(Some(landmarks)) => entries.push((id, landmarks)),
            Ok(None) => debug!("no face found in {}", id),
            Err(cause) => return Err(Error::Detector { id, cause }),
        }
    }
    Ok(entries)
}

/// Make sure the landmark cache of `dir` exists and return its path.
///
/// The detector is only used when the cache file is missing.
pub fn ensure_built<D>(dir: &Path, detector: &mut D) -> Result<PathBuf>
where
    D: LandmarkDetector + ?Sized,
{
    if !dir.is_dir() {
        return Err(Error::MissingDirectory(dir.to_path_buf()));
    }
    let path = cache_path(dir);
    if path.is_file() {
        debug!("reusing landmark cache {}", path.display());
        return Ok(path);
    }

    info!("building landmark cache for {}", dir.display());
    let cache = LandmarkCache::from_entries(build_entries(dir, detector)?);
    cache.save(&path)?;
    info!("cached landmarks for {} images at {}", cache.len(), path.display());
    Ok(path)
}

/// Landmarks of every usable image of a directory, keyed by image id.
///
/// Read-only once loaded, so it can be shared between worker threads.
#[derive(Debug, Clone, Default)]
pub struct LandmarkCache {
    ids: Vec<String>,
    entries: HashMap<String, LandmarkSet>,
}

impl LandmarkCache {
    pub fn from_entries(entries: Vec<(String, LandmarkSet)>) -> Self {
        let mut cache = Self::default();
        for (id, landmarks) in entries {
            if cache.entries.insert(id.clone(), landmarks).is_none() {
                cache.ids.push(id);
            }
        }
        cache
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let file: CacheFile = postcard::from_bytes(&data)?;
        Ok(Self::from_entries(file.entries))
    }

    /// Write the cache, replacing `path` only once the data is fully written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = CacheFile {
            entries: self
                .iter()
                .map(|(id, lm)| (id.to_string(), lm.clone()))
                .collect(),
        };
        let data = postcard::to_allocvec(&file)?;
        let mut tmp = OsString::from(path.as_os_str());
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in the order the directory was walked.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn get(&self, id: &str) -> Option<&LandmarkSet> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LandmarkSet)> + '_ {
        self.ids
            .iter()
            .filter_map(move |id| self.entries.get(id).map(|lm| (id.as_str(), lm)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_strips_trailing_separator() {
        assert_eq!(cache_path(Path::new("data/real/")), PathBuf::from("data/real_landmark"));
        assert_eq!(cache_path(Path::new("data/real")), PathBuf::from("data/real_landmark"));
    }

    #[test]
    fn image_extensions() {
        assert!(is_image_file(Path::new("a/b.png")));
        assert!(is_image_file(Path::new("a/b.JPEG")));
        assert!(!is_image_file(Path::new("a/b.txt")));
        assert!(!is_image_file(Path::new("a/png")));
    }

    #[test]
    fn ids_are_relative_paths() {
        let root = Path::new("/data/real");
        assert_eq!(image_id(root, Path::new("/data/real/a_001.png")), "a_001.png");
        assert_eq!(image_id(root, Path::new("/data/real/sub/b_002.png")), "sub/b_002.png");
    }

    #[test]
    fn save_load_roundtrip_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_landmark");
        let cache = LandmarkCache::from_entries(vec![
            ("b_1.png".into(), LandmarkSet::from_points(&[(1.0, 2.0), (3.5, 4.0)])),
            ("a_1.png".into(), LandmarkSet::from_points(&[(5.0, 6.0), (7.0, 8.25)])),
        ]);
        cache.save(&path).unwrap();
        let loaded = LandmarkCache::load(&path).unwrap();
        assert_eq!(loaded.ids(), &["b_1.png".to_string(), "a_1.png".to_string()]);
        assert_eq!(loaded.get("a_1.png"), cache.get("a_1.png"));
        assert!(!path.with_file_name("x_landmark.tmp").exists());
    }

    #[test]
    fn missing_directory_is_error() {
        let mut detector = |_: &image::RgbImage| -> anyhow::Result<Option<LandmarkSet>> { Ok(None) };
        let err = ensure_built(Path::new("/definitely/not/here"), &mut detector).unwrap_err();
        assert!(matches!(err, Error::MissingDirectory(_)));
    }
}
