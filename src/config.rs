use anyhow::{Context, Result};
use i2g_vision::{BlurParams, ElasticParams};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("I2G_CONFIG_PATH").unwrap_or("i2g.toml"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Side of the square datapoints produced by the generator.
    pub load_size: u32,
    /// Center-crop size of the training tensors.
    pub fine_size: u32,
    /// The id list is randomly subsampled down to this many entries.
    pub max_dataset_size: Option<usize>,
    /// Donor candidates drawn per forged sample.
    pub sample_num: usize,
    /// Feather width as a fraction of the face size.
    pub feather: f32,
    /// Separator ending the session prefix of a file name.
    pub session_separator: char,
    pub jpeg_quality: (u8, u8),
    pub elastic: ElasticParams,
    pub blur: BlurParams,
    pub transform: TransformConfig,
    pub detector: DetectorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            load_size: 256,
            fine_size: 256,
            max_dataset_size: None,
            sample_num: 50,
            feather: 0.2,
            session_separator: '_',
            jpeg_quality: (60, 100),
            elastic: ElasticParams::default(),
            blur: BlurParams::default(),
            transform: TransformConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

/// Test-time augmentation toggles for the validation transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub test_flip: bool,
    pub test_compression: bool,
    /// JPEG quality used when `test_compression` is set.
    pub compression: u8,
    pub test_blur: bool,
    /// Box blur kernel size used when `test_blur` is set.
    pub blur: u32,
    pub test_gamma: bool,
    /// Gamma in percent used when `test_gamma` is set.
    pub gamma: u32,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            test_flip: false,
            test_compression: false,
            compression: 75,
            test_blur: false,
            blur: 3,
            test_gamma: false,
            gamma: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: Option<PathBuf>,
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: None,
            input_size: 112,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading i2g config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid i2g config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg).context("serializing i2g config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }
    std::fs::write(path, data).with_context(|| format!("writing i2g config {}", path.display()))
}
