// src/lib.rs
pub mod data {
    pub mod handle;
    pub mod analysis;
    pub mod png_io;
    pub mod image_store;
}

pub mod batch;
pub mod config;
pub mod error;

pub use data::handle::AnnotationDb;
pub use data::image_store::FsImageStore;
pub use data::png_io::PngEncoder;
pub use error::StoreError;
