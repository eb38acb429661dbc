// data module
pub mod data {
    pub mod ion_image;
    pub mod thumbnail;
}

// algorithm module
pub mod algorithm {
    pub mod filter;
    pub mod kmeans;
    pub mod overlap;
    pub mod centralness;
    pub mod compose;
    pub mod strategy;
}

pub mod error;
pub mod generate;

// Re-export commonly used types
pub use algorithm::strategy::{Strategy, DEFAULT_STRATEGY};
pub use data::ion_image::{CandidateSet, ValidityMask};
pub use data::thumbnail::Thumbnail;
pub use error::ThumbnailError;
pub use generate::{ImageHandle, ThumbnailGenerator, ThumbnailSettings};
