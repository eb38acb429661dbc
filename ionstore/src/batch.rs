//! Thumbnail generation across many datasets.

use std::path::Path;

use ioncore::algorithm::strategy::Strategy;
use ioncore::generate::{ImageHandle, ThumbnailGenerator, ThumbnailSettings};
use rayon::prelude::*;
use tracing::{error, info};

use crate::data::handle::AnnotationDb;
use crate::data::image_store::FsImageStore;
use crate::data::png_io::PngEncoder;
use crate::error::StoreError;

/// Outcome of one dataset.
#[derive(Debug)]
pub struct DatasetOutcome {
    pub ds_id: String,
    pub thumbnail: Option<ImageHandle>,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub generated: usize,
    pub skipped: usize,
    pub results: Vec<DatasetOutcome>,
}

/// Generate thumbnails for every dataset in parallel.
///
/// Each dataset gets its own database connection. The strategy name is checked
/// once up front; an unknown name fails the whole batch.
pub fn generate_for_datasets(
    db_path: &Path,
    store: &FsImageStore,
    strategy_name: &str,
    only_missing: bool,
    settings: &ThumbnailSettings,
    ds_ids: &[String],
    num_threads: usize,
) -> Result<BatchSummary, StoreError> {
    let strategy: Strategy = strategy_name.parse()?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;

    let results: Vec<DatasetOutcome> = pool.install(|| {
        ds_ids
            .par_iter()
            .map(|ds_id| {
                let thumbnail = match generate_one(db_path, store, strategy, only_missing, settings, ds_id) {
                    Ok(handle) => handle,
                    Err(e) => {
                        error!(ds_id = ds_id.as_str(), "thumbnail worker failed: {}", e);
                        None
                    }
                };
                DatasetOutcome { ds_id: ds_id.clone(), thumbnail }
            })
            .collect()
    });

    let generated = results.iter().filter(|r| r.thumbnail.is_some()).count();
    let summary = BatchSummary { generated, skipped: results.len() - generated, results };
    info!(
        %strategy,
        generated = summary.generated,
        skipped = summary.skipped,
        "finished ion thumbnail batch"
    );
    Ok(summary)
}

fn generate_one(
    db_path: &Path,
    store: &FsImageStore,
    strategy: Strategy,
    only_missing: bool,
    settings: &ThumbnailSettings,
    ds_id: &str,
) -> Result<Option<ImageHandle>, StoreError> {
    let db = AnnotationDb::new(db_path)?;
    let generator = ThumbnailGenerator::new(&db, store, &PngEncoder, settings.clone());
    Ok(generator.generate_thumbnail(ds_id, strategy.name(), only_missing)?)
}
