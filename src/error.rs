//! Error types for chip counting

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for chip counting operations
pub type Result<T> = std::result::Result<T, ChipError>;

/// Failures surfaced by [`crate::ChipCounter`].
///
/// Degenerate detections (empty crops, silent masks, stacks without seams)
/// never show up here; they resolve to safe defaults inside the pipeline.
#[derive(Error, Debug)]
pub enum ChipError {
    /// The input path does not reference an existing file
    #[error("image not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The input bytes could not be decoded as an image
    #[error("could not decode image {name}: {source}")]
    InvalidInput {
        name: String,
        #[source]
        source: image::ImageError,
    },

    /// Segmentation backend failure, passed through untouched
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl ChipError {
    pub fn invalid_input(name: impl Into<String>, source: image::ImageError) -> Self {
        Self::InvalidInput {
            name: name.into(),
            source,
        }
    }

    /// True for the two I/O-level kinds (missing or undecodable input)
    pub fn is_input_error(&self) -> bool {
        matches!(self, ChipError::NotFound(_) | ChipError::InvalidInput { .. })
    }
}
