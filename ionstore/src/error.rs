//! Errors raised by the database, image store and codec adapters.

use ioncore::error::{BoxError, ThumbnailError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("png decoding error: {0}")]
    Decode(#[from] png::DecodingError),

    #[error("png encoding error: {0}")]
    Encode(#[from] png::EncodingError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported png layout: {color:?} at {depth:?}")]
    UnsupportedPng {
        color: png::ColorType,
        depth: png::BitDepth,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid image id: {0:?}")]
    InvalidId(String),

    #[error(transparent)]
    Core(#[from] ThumbnailError),
}

impl StoreError {
    /// Box for the collaborator traits, passing core errors through unwrapped.
    pub fn into_boxed(self) -> BoxError {
        match self {
            StoreError::Core(e) => Box::new(e),
            other => Box::new(other),
        }
    }
}
