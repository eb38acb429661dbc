//! Thumbnail generation for one dataset.
//!
//! Fetches ranked ion images through the collaborator traits, renders them with a
//! [`Strategy`] and replaces the dataset's stored thumbnail. Generation is best
//! effort: failures are logged and reported as "no thumbnail".

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::algorithm::kmeans::KMeansSettings;
use crate::algorithm::strategy::Strategy;
use crate::data::ion_image::{CandidateSet, ValidityMask};
use crate::data::thumbnail::Thumbnail;
use crate::error::{BoxError, Result, ThumbnailError};

/// Opaque identifier of an image in the image store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageHandle(pub String);

impl ImageHandle {
    pub fn new(id: impl Into<String>) -> Self {
        ImageHandle(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ranked annotations and the per-dataset thumbnail reference.
pub trait AnnotationSource {
    /// Ion image ids of the dataset's annotations, best first.
    fn fetch_ranked_images(&self, ds_id: &str, max_count: usize) -> std::result::Result<Vec<String>, BoxError>;

    fn get_existing_thumbnail(&self, ds_id: &str) -> std::result::Result<Option<ImageHandle>, BoxError>;

    fn set_thumbnail(&self, ds_id: &str, handle: &ImageHandle) -> std::result::Result<(), BoxError>;
}

/// Image storage: loads ion images for analysis and stores generated ones.
pub trait ImageStore {
    /// Load, resize and hotspot-normalize the given ion images.
    fn load_images_for_analysis(
        &self,
        image_ids: &[String],
        max_size: (usize, usize),
        hotspot_percentile: usize,
    ) -> std::result::Result<(CandidateSet, ValidityMask), BoxError>;

    fn store_image(&self, namespace: &str, kind: &str, bytes: &[u8]) -> std::result::Result<ImageHandle, BoxError>;

    fn delete_image(&self, namespace: &str, kind: &str, handle: &ImageHandle) -> std::result::Result<(), BoxError>;
}

/// Encodes a raster into the stored transport format.
pub trait RasterEncoder {
    fn encode(&self, thumbnail: &Thumbnail) -> std::result::Result<Vec<u8>, BoxError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailSettings {
    /// Upper bound on ranked candidates fetched per dataset.
    pub max_candidates: usize,
    /// Largest (height, width) images are downsampled to.
    pub max_size: (usize, usize),
    /// Intensity percentile at which hotspots are clipped. Kept below 99 to brighten images.
    pub hotspot_percentile: usize,
    pub namespace: String,
    pub kind: String,
    pub kmeans: KMeansSettings,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            max_candidates: 500,
            max_size: (200, 200),
            hotspot_percentile: 90,
            namespace: "fs".to_string(),
            kind: "ion_thumbnail".to_string(),
            kmeans: KMeansSettings::default(),
        }
    }
}

/// Generates and persists thumbnails through borrowed collaborators.
pub struct ThumbnailGenerator<'a, A, S, E> {
    pub annotations: &'a A,
    pub store: &'a S,
    pub encoder: &'a E,
    pub settings: ThumbnailSettings,
}

impl<'a, A, S, E> ThumbnailGenerator<'a, A, S, E>
where
    A: AnnotationSource,
    S: ImageStore,
    E: RasterEncoder,
{
    pub fn new(annotations: &'a A, store: &'a S, encoder: &'a E, settings: ThumbnailSettings) -> Self {
        ThumbnailGenerator { annotations, store, encoder, settings }
    }

    /// Generate and store a thumbnail for `ds_id`, replacing any previous one.
    ///
    /// An unknown `strategy_name` is returned as [`ThumbnailError::UnsupportedAlgorithm`]
    /// before any collaborator is contacted. Every other failure is logged and yields
    /// `Ok(None)`. With `only_if_missing`, an existing thumbnail is returned untouched.
    pub fn generate_thumbnail(
        &self,
        ds_id: &str,
        strategy_name: &str,
        only_if_missing: bool,
    ) -> Result<Option<ImageHandle>> {
        let strategy: Strategy = strategy_name.parse()?;

        match self.try_generate(ds_id, strategy, only_if_missing) {
            Ok(handle) => Ok(handle),
            Err(e) if e.is_empty_result() => {
                warn!(ds_id, "could not create ion thumbnail: {}", e);
                Ok(None)
            }
            Err(e) => {
                error!(ds_id, %strategy, error = ?e, "error generating ion thumbnail image: {}", e);
                Ok(None)
            }
        }
    }

    /// Render the thumbnail raster without persisting it.
    pub fn render(&self, ds_id: &str, strategy: Strategy) -> Result<Thumbnail> {
        let image_ids = self
            .annotations
            .fetch_ranked_images(ds_id, self.settings.max_candidates)
            .map_err(ThumbnailError::from_collaborator)?;
        if image_ids.is_empty() {
            return Err(ThumbnailError::NoCandidates(ds_id.to_string()));
        }

        let (candidates, mask) = self
            .store
            .load_images_for_analysis(&image_ids, self.settings.max_size, self.settings.hotspot_percentile)
            .map_err(ThumbnailError::from_collaborator)?;
        if candidates.is_empty() {
            return Err(ThumbnailError::NoCandidates(ds_id.to_string()));
        }

        debug!(
            ds_id,
            %strategy,
            n_images = candidates.len(),
            height = candidates.height,
            width = candidates.width,
            "generating ion thumbnail"
        );
        strategy.render(&candidates, &mask, &self.settings.kmeans)
    }

    fn try_generate(&self, ds_id: &str, strategy: Strategy, only_if_missing: bool) -> Result<Option<ImageHandle>> {
        let existing = self
            .annotations
            .get_existing_thumbnail(ds_id)
            .map_err(ThumbnailError::from_collaborator)?;

        if only_if_missing {
            if let Some(handle) = existing {
                debug!(ds_id, %handle, "thumbnail already present");
                return Ok(Some(handle));
            }
        }

        let thumbnail = self.render(ds_id, strategy)?;
        let bytes = self.encoder.encode(&thumbnail).map_err(ThumbnailError::from_collaborator)?;

        let settings = &self.settings;
        let handle = self
            .store
            .store_image(&settings.namespace, &settings.kind, &bytes)
            .map_err(ThumbnailError::from_collaborator)?;
        if let Err(e) = self.annotations.set_thumbnail(ds_id, &handle) {
            // the new image is unreferenced, remove it before reporting
            if let Err(cleanup) = self.store.delete_image(&settings.namespace, &settings.kind, &handle) {
                warn!(ds_id, %handle, "could not remove unreferenced thumbnail: {}", cleanup);
            }
            return Err(ThumbnailError::from_collaborator(e));
        }

        if let Some(old) = existing {
            if let Err(e) = self.store.delete_image(&settings.namespace, &settings.kind, &old) {
                warn!(ds_id, %old, "could not delete previous thumbnail: {}", e);
            }
        }

        info!(ds_id, %strategy, %handle, "stored ion thumbnail");
        Ok(Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct MockAnnotations {
        ranked: Vec<String>,
        existing: RefCell<Option<ImageHandle>>,
        calls: RefCell<Vec<String>>,
    }

    impl AnnotationSource for MockAnnotations {
        fn fetch_ranked_images(&self, _ds_id: &str, max_count: usize) -> std::result::Result<Vec<String>, BoxError> {
            self.calls.borrow_mut().push("fetch".to_string());
            Ok(self.ranked.iter().take(max_count).cloned().collect())
        }

        fn get_existing_thumbnail(&self, _ds_id: &str) -> std::result::Result<Option<ImageHandle>, BoxError> {
            self.calls.borrow_mut().push("get".to_string());
            Ok(self.existing.borrow().clone())
        }

        fn set_thumbnail(&self, _ds_id: &str, handle: &ImageHandle) -> std::result::Result<(), BoxError> {
            self.calls.borrow_mut().push(format!("set {}", handle));
            *self.existing.borrow_mut() = Some(handle.clone());
            Ok(())
        }
    }

    struct MockStore {
        images: Vec<Vec<f32>>,
        shape: (usize, usize),
        fail_load: bool,
        calls: RefCell<Vec<String>>,
    }

    impl MockStore {
        fn new(images: Vec<Vec<f32>>, shape: (usize, usize)) -> Self {
            MockStore { images, shape, fail_load: false, calls: RefCell::new(Vec::new()) }
        }
    }

    impl ImageStore for MockStore {
        fn load_images_for_analysis(
            &self,
            image_ids: &[String],
            _max_size: (usize, usize),
            _hotspot_percentile: usize,
        ) -> std::result::Result<(CandidateSet, ValidityMask), BoxError> {
            self.calls.borrow_mut().push("load".to_string());
            if self.fail_load {
                return Err("image store unavailable".into());
            }
            let (h, w) = self.shape;
            let images = self.images.iter().take(image_ids.len()).cloned().collect();
            Ok((CandidateSet::new(h, w, images)?, ValidityMask::full(h, w)))
        }

        fn store_image(&self, _namespace: &str, _kind: &str, bytes: &[u8]) -> std::result::Result<ImageHandle, BoxError> {
            self.calls.borrow_mut().push(format!("store {}", bytes.len()));
            Ok(ImageHandle::new("new-thumb"))
        }

        fn delete_image(&self, _namespace: &str, _kind: &str, handle: &ImageHandle) -> std::result::Result<(), BoxError> {
            self.calls.borrow_mut().push(format!("delete {}", handle));
            Ok(())
        }
    }

    struct RawEncoder;

    impl RasterEncoder for RawEncoder {
        fn encode(&self, thumbnail: &Thumbnail) -> std::result::Result<Vec<u8>, BoxError> {
            Ok(thumbnail.data.clone())
        }
    }

    fn ranked(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("img-{}", i)).collect()
    }

    fn one_hot_images(n: usize, len: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| (0..len).map(|p| if p % n == i { 1.0 } else { 0.0 }).collect())
            .collect()
    }

    #[test]
    fn test_generates_and_replaces_existing() {
        let annotations = MockAnnotations {
            ranked: ranked(2),
            existing: RefCell::new(Some(ImageHandle::new("old-thumb"))),
            ..Default::default()
        };
        let store = MockStore::new(one_hot_images(2, 16), (4, 4));
        let generator = ThumbnailGenerator::new(&annotations, &store, &RawEncoder, ThumbnailSettings::default());

        let handle = generator.generate_thumbnail("ds1", "image-centroid", false).unwrap();
        assert_eq!(handle, Some(ImageHandle::new("new-thumb")));
        assert_eq!(
            *store.calls.borrow(),
            vec!["load".to_string(), format!("store {}", 4 * 4 * 4), "delete old-thumb".to_string()]
        );
        assert!(annotations.calls.borrow().contains(&"set new-thumb".to_string()));
    }

    #[test]
    fn test_no_candidates_returns_none_without_persisting() {
        let annotations = MockAnnotations::default();
        let store = MockStore::new(Vec::new(), (4, 4));
        let generator = ThumbnailGenerator::new(&annotations, &store, &RawEncoder, ThumbnailSettings::default());

        assert_eq!(generator.generate_thumbnail("ds1", "image-centroid", false).unwrap(), None);
        assert!(store.calls.borrow().is_empty());
        assert!(!annotations.calls.borrow().iter().any(|c| c.starts_with("set")));
    }

    #[test]
    fn test_unsupported_algorithm_is_surfaced() {
        let annotations = MockAnnotations { ranked: ranked(3), ..Default::default() };
        let store = MockStore::new(one_hot_images(3, 9), (3, 3));
        let generator = ThumbnailGenerator::new(&annotations, &store, &RawEncoder, ThumbnailSettings::default());

        let err = generator.generate_thumbnail("ds1", "not-a-real-strategy", false).unwrap_err();
        assert!(matches!(err, ThumbnailError::UnsupportedAlgorithm(_)));
        assert!(store.calls.borrow().is_empty());
        assert!(annotations.calls.borrow().is_empty());
    }

    #[test]
    fn test_only_if_missing_keeps_existing() {
        let annotations = MockAnnotations {
            ranked: ranked(3),
            existing: RefCell::new(Some(ImageHandle::new("old-thumb"))),
            ..Default::default()
        };
        let store = MockStore::new(one_hot_images(3, 9), (3, 3));
        let generator = ThumbnailGenerator::new(&annotations, &store, &RawEncoder, ThumbnailSettings::default());

        let handle = generator.generate_thumbnail("ds1", "smart-image-medoid", true).unwrap();
        assert_eq!(handle, Some(ImageHandle::new("old-thumb")));
        assert!(store.calls.borrow().is_empty());
        assert_eq!(*annotations.calls.borrow(), vec!["get".to_string()]);
    }

    #[test]
    fn test_only_if_missing_generates_when_absent() {
        let annotations = MockAnnotations { ranked: ranked(3), ..Default::default() };
        let store = MockStore::new(one_hot_images(3, 9), (3, 3));
        let generator = ThumbnailGenerator::new(&annotations, &store, &RawEncoder, ThumbnailSettings::default());

        let handle = generator.generate_thumbnail("ds1", "pixel-distance", true).unwrap();
        assert_eq!(handle, Some(ImageHandle::new("new-thumb")));
        assert!(!store.calls.borrow().iter().any(|c| c.starts_with("delete")));
    }

    #[test]
    fn test_collaborator_failure_yields_none() {
        let annotations = MockAnnotations { ranked: ranked(3), ..Default::default() };
        let mut store = MockStore::new(one_hot_images(3, 9), (3, 3));
        store.fail_load = true;
        let generator = ThumbnailGenerator::new(&annotations, &store, &RawEncoder, ThumbnailSettings::default());

        assert_eq!(generator.generate_thumbnail("ds1", "image-medoid", false).unwrap(), None);
        assert!(!store.calls.borrow().iter().any(|c| c.starts_with("store")));
    }

    #[test]
    fn test_shape_mismatch_is_not_persisted() {
        struct MismatchedStore;
        impl ImageStore for MismatchedStore {
            fn load_images_for_analysis(
                &self,
                _image_ids: &[String],
                _max_size: (usize, usize),
                _hotspot_percentile: usize,
            ) -> std::result::Result<(CandidateSet, ValidityMask), BoxError> {
                Ok((CandidateSet::new(2, 2, vec![vec![1.0; 4]])?, ValidityMask::full(3, 3)))
            }
            fn store_image(&self, _: &str, _: &str, _: &[u8]) -> std::result::Result<ImageHandle, BoxError> {
                panic!("must not store a thumbnail after a shape mismatch");
            }
            fn delete_image(&self, _: &str, _: &str, _: &ImageHandle) -> std::result::Result<(), BoxError> {
                panic!("must not delete after a shape mismatch");
            }
        }

        let annotations = MockAnnotations { ranked: ranked(1), ..Default::default() };
        let generator =
            ThumbnailGenerator::new(&annotations, &MismatchedStore, &RawEncoder, ThumbnailSettings::default());
        assert!(matches!(
            generator.render("ds1", Strategy::ImageCentroid),
            Err(ThumbnailError::ImageShapeMismatch { .. })
        ));
        assert_eq!(generator.generate_thumbnail("ds1", "image-centroid", false).unwrap(), None);
    }

    /// Store that records stored and deleted handles and can refuse deletes.
    #[derive(Default)]
    struct RecordingStore {
        fail_delete: bool,
        stored: RefCell<Vec<String>>,
    }

    impl ImageStore for RecordingStore {
        fn load_images_for_analysis(
            &self,
            image_ids: &[String],
            _max_size: (usize, usize),
            _hotspot_percentile: usize,
        ) -> std::result::Result<(CandidateSet, ValidityMask), BoxError> {
            Ok((CandidateSet::new(3, 3, one_hot_images(image_ids.len(), 9))?, ValidityMask::full(3, 3)))
        }

        fn store_image(&self, _namespace: &str, _kind: &str, _bytes: &[u8]) -> std::result::Result<ImageHandle, BoxError> {
            self.stored.borrow_mut().push("new".to_string());
            Ok(ImageHandle::new("new"))
        }

        fn delete_image(&self, _namespace: &str, _kind: &str, handle: &ImageHandle) -> std::result::Result<(), BoxError> {
            if self.fail_delete {
                return Err("io".into());
            }
            self.stored.borrow_mut().retain(|h| h != handle.as_str());
            Ok(())
        }
    }

    #[test]
    fn test_failed_delete_of_previous_still_returns_handle() {
        let annotations = MockAnnotations {
            ranked: ranked(3),
            existing: RefCell::new(Some(ImageHandle::new("old"))),
            ..Default::default()
        };
        let store = RecordingStore { fail_delete: true, ..Default::default() };
        let generator = ThumbnailGenerator::new(&annotations, &store, &RawEncoder, ThumbnailSettings::default());

        let handle = generator.generate_thumbnail("ds1", "image-centroid", false).unwrap();
        assert_eq!(handle, Some(ImageHandle::new("new")));
        assert_eq!(*annotations.existing.borrow(), Some(ImageHandle::new("new")));
    }

    #[test]
    fn test_failed_reference_update_removes_new_image() {
        struct FailingAnnotations;
        impl AnnotationSource for FailingAnnotations {
            fn fetch_ranked_images(&self, _: &str, max_count: usize) -> std::result::Result<Vec<String>, BoxError> {
                Ok(ranked(3).into_iter().take(max_count).collect())
            }
            fn get_existing_thumbnail(&self, _: &str) -> std::result::Result<Option<ImageHandle>, BoxError> {
                Ok(None)
            }
            fn set_thumbnail(&self, _: &str, _: &ImageHandle) -> std::result::Result<(), BoxError> {
                Err("db down".into())
            }
        }

        let store = RecordingStore::default();
        let generator =
            ThumbnailGenerator::new(&FailingAnnotations, &store, &RawEncoder, ThumbnailSettings::default());

        assert_eq!(generator.generate_thumbnail("ds1", "image-medoid", false).unwrap(), None);
        assert!(store.stored.borrow().is_empty());
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: ThumbnailSettings =
            serde_json::from_str(r#"{"hotspot_percentile": 99, "kmeans": {"seed": 3}}"#).unwrap();
        assert_eq!(settings.hotspot_percentile, 99);
        assert_eq!(settings.kmeans.seed, 3);
        assert_eq!(settings.kmeans.max_iter, 300);
        assert_eq!(settings.max_candidates, 500);
        assert_eq!(settings.kind, "ion_thumbnail");
    }
}
