use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("landmark cache encoding error: {0}")]
    Cache(#[from] postcard::Error),

    #[error("{} is not a valid directory", .0.display())]
    MissingDirectory(PathBuf),

    #[error("landmark shapes differ: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("no donor candidate outside the session of {id}")]
    EmptyCandidatePool { id: String },

    #[error("no landmarks cached for {0}")]
    MissingLandmarks(String),

    #[error("sample index {index} out of range for {len} samples")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("landmark detector failed on {id}: {cause}")]
    Detector { id: String, cause: anyhow::Error },

    #[error("forgery stage failed: {0}")]
    Stage(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
