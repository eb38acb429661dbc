//! Thumbnail generation errors.

use std::error::Error;

/// Error type returned by collaborators (ranking source, image store, encoder).
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Errors that can occur while generating an ion thumbnail.
#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    /// No ranked images exist for the dataset. A normal, empty outcome.
    #[error("no candidate images found for dataset {0}")]
    NoCandidates(String),

    /// Strategy name is not in the registry.
    #[error("unsupported thumbnail algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Candidate images and mask disagree in shape.
    #[error("image shape mismatch: expected {expected:?}, got {got:?}")]
    ImageShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// A flattened buffer holds the wrong number of values for its shape.
    #[error("pixel count mismatch: shape {shape:?} needs {expected} values, got {got}")]
    PixelCountMismatch {
        shape: (usize, usize),
        expected: usize,
        got: usize,
    },

    /// Clustering or compositing could not produce a valid raster.
    #[error("thumbnail generation failed: {0}")]
    GenerationFailure(String),

    /// A collaborator (database, image store, encoder) failed.
    #[error("collaborator failure: {0}")]
    Collaborator(#[source] BoxError),
}

impl ThumbnailError {
    /// Whether the error is an expected empty result rather than a failure.
    #[inline]
    pub fn is_empty_result(&self) -> bool {
        matches!(self, Self::NoCandidates(_))
    }

    /// Wrap a collaborator error, unwrapping it if it already is a `ThumbnailError`.
    pub fn from_collaborator(e: BoxError) -> Self {
        match e.downcast::<ThumbnailError>() {
            Ok(inner) => *inner,
            Err(other) => Self::Collaborator(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ThumbnailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_collaborator_keeps_typed_errors() {
        let boxed: BoxError = Box::new(ThumbnailError::ImageShapeMismatch { expected: (2, 2), got: (3, 3) });
        assert!(matches!(
            ThumbnailError::from_collaborator(boxed),
            ThumbnailError::ImageShapeMismatch { .. }
        ));

        let boxed: BoxError = "disk full".into();
        let err = ThumbnailError::from_collaborator(boxed);
        assert!(matches!(err, ThumbnailError::Collaborator(_)));
        assert_eq!(err.to_string(), "collaborator failure: disk full");
    }
}
