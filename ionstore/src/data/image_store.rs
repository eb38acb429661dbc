use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ioncore::data::ion_image::{CandidateSet, ValidityMask};
use ioncore::error::{BoxError, ThumbnailError};
use ioncore::generate::{ImageHandle, ImageStore};
use rayon::prelude::*;
use tracing::debug;
use uuid::Uuid;

use crate::data::analysis::{fit_within, prepare_for_analysis, resize_nearest, IonImage};
use crate::data::png_io::decode_ion_image;
use crate::error::StoreError;

/// Kind under which ion images are stored.
pub const ION_IMAGE_KIND: &str = "iso_image";

/// Filesystem image store laid out as `<root>/<namespace>/<kind>/<id>.png`.
#[derive(Clone, Debug)]
pub struct FsImageStore {
    pub root: PathBuf,
    /// Namespace ion images are read from.
    pub ion_namespace: String,
}

fn check_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

impl FsImageStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(FsImageStore { root, ion_namespace: "fs".to_string() })
    }

    fn image_path(&self, namespace: &str, kind: &str, id: &str) -> Result<PathBuf, StoreError> {
        check_id(namespace)?;
        check_id(kind)?;
        check_id(id)?;
        Ok(self.root.join(namespace).join(kind).join(format!("{}.png", id)))
    }

    /// Store bytes under a fresh id.
    pub fn post_image(&self, namespace: &str, kind: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        self.put_image(namespace, kind, &id, bytes)?;
        Ok(id)
    }

    pub fn put_image(&self, namespace: &str, kind: &str, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.image_path(namespace, kind, id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn get_image(&self, namespace: &str, kind: &str, id: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.image_path(namespace, kind, id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("{}/{}/{}", namespace, kind, id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove an image. Deleting a missing image is not an error.
    pub fn delete_image_by_id(&self, namespace: &str, kind: &str, id: &str) -> Result<(), StoreError> {
        let path = self.image_path(namespace, kind, id)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Decode ion images and prepare them for clustering.
    ///
    /// The validity mask is taken from the first image's alpha channel. All
    /// images must share its dimensions.
    pub fn get_ion_images_for_analysis(
        &self,
        namespace: &str,
        image_ids: &[String],
        max_size: (usize, usize),
        hotspot_percentile: usize,
    ) -> Result<(CandidateSet, ValidityMask), StoreError> {
        if image_ids.is_empty() {
            return Ok((CandidateSet::empty(0, 0), ValidityMask::full(0, 0)));
        }

        let images: Vec<IonImage> = image_ids
            .par_iter()
            .map(|id| decode_ion_image(&self.get_image(namespace, ION_IMAGE_KIND, id)?))
            .collect::<Result<_, StoreError>>()?;

        let (height, width) = images[0].shape();
        if let Some(other) = images.iter().find(|img| img.shape() != (height, width)) {
            return Err(ThumbnailError::ImageShapeMismatch { expected: (height, width), got: other.shape() }.into());
        }

        let (new_h, new_w) = fit_within(height, width, max_size);
        let full_mask = match &images[0].alpha {
            Some(alpha) => alpha.clone(),
            None => vec![true; height * width],
        };
        let mask = ValidityMask::new(new_h, new_w, resize_nearest(&full_mask, height, width, new_h, new_w))?;

        let prepared: Vec<Vec<f32>> = images
            .par_iter()
            .map(|img| prepare_for_analysis(img, &mask.pixels, (new_h, new_w), hotspot_percentile))
            .collect();
        debug!(
            n_images = prepared.len(),
            height = new_h,
            width = new_w,
            "loaded ion images for analysis"
        );

        Ok((CandidateSet::new(new_h, new_w, prepared)?, mask))
    }
}

impl ImageStore for FsImageStore {
    fn load_images_for_analysis(
        &self,
        image_ids: &[String],
        max_size: (usize, usize),
        hotspot_percentile: usize,
    ) -> Result<(CandidateSet, ValidityMask), BoxError> {
        self.get_ion_images_for_analysis(&self.ion_namespace, image_ids, max_size, hotspot_percentile)
            .map_err(StoreError::into_boxed)
    }

    fn store_image(&self, namespace: &str, kind: &str, bytes: &[u8]) -> Result<ImageHandle, BoxError> {
        self.post_image(namespace, kind, bytes)
            .map(ImageHandle)
            .map_err(StoreError::into_boxed)
    }

    fn delete_image(&self, namespace: &str, kind: &str, handle: &ImageHandle) -> Result<(), BoxError> {
        self.delete_image_by_id(namespace, kind, handle.as_str())
            .map_err(StoreError::into_boxed)
    }
}
