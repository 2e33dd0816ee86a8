pub mod augment;
pub mod blend;
pub mod detector;
pub mod hull;
pub mod landmarks;
pub mod mask;
pub mod postprocess;

// Re-export commonly used types
pub use detector::OnnxLandmarkDetector;
pub use hull::HullKind;
pub use landmarks::{LandmarkDetector, LandmarkSet};
pub use mask::Mask;
pub use postprocess::{BlurParams, ElasticParams};
