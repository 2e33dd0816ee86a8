pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod matcher;
pub mod transform;

pub use cache::LandmarkCache;
pub use dataset::{Datapoint, I2gDataset, Label, Sample, SamplePipelines};
pub use error::{Error, Result};

// Re-export vision types for convenience
pub use i2g_vision::{HullKind, LandmarkDetector, LandmarkSet, Mask, OnnxLandmarkDetector};
