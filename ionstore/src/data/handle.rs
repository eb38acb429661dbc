use std::path::Path;
use std::time::Duration;

use ioncore::error::BoxError;
use ioncore::generate::{AnnotationSource, ImageHandle};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

// Ranked by FDR, then by MSM score, best first
const ISO_IMAGE_SEL: &str = "SELECT m.iso_image_ids \
     FROM iso_image_metrics m \
     JOIN job j ON j.id = m.job_id \
     WHERE j.ds_id = ?1 \
     ORDER BY m.fdr ASC, m.msm DESC \
     LIMIT ?2";

const THUMB_SEL: &str = "SELECT ion_thumbnail FROM dataset WHERE id = ?1";

const THUMB_UPD: &str = "UPDATE dataset SET ion_thumbnail = ?1 WHERE id = ?2";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS dataset (
    id TEXT PRIMARY KEY,
    ion_thumbnail TEXT
);
CREATE TABLE IF NOT EXISTS job (
    id INTEGER PRIMARY KEY,
    ds_id TEXT NOT NULL REFERENCES dataset(id)
);
CREATE TABLE IF NOT EXISTS iso_image_metrics (
    job_id INTEGER NOT NULL REFERENCES job(id),
    fdr REAL NOT NULL,
    msm REAL NOT NULL,
    iso_image_ids TEXT NOT NULL
);
";

/// Annotation database: ranked ion image ids and dataset thumbnail references.
#[derive(Debug)]
pub struct AnnotationDb {
    pub connection: Connection,
}

impl AnnotationDb {
    pub fn new(path: &Path) -> rusqlite::Result<Self> {
        let connection = Connection::open(path)?;
        // several batch workers may write the same file
        connection.busy_timeout(Duration::from_secs(30))?;
        Ok(Self { connection })
    }

    pub fn in_memory() -> rusqlite::Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self { connection })
    }

    pub fn create_schema(&self) -> rusqlite::Result<()> {
        self.connection.execute_batch(SCHEMA)
    }

    pub fn insert_dataset(&self, ds_id: &str) -> rusqlite::Result<()> {
        self.connection
            .execute("INSERT INTO dataset (id, ion_thumbnail) VALUES (?1, NULL)", params![ds_id])?;
        Ok(())
    }

    pub fn insert_job(&self, job_id: i64, ds_id: &str) -> rusqlite::Result<()> {
        self.connection
            .execute("INSERT INTO job (id, ds_id) VALUES (?1, ?2)", params![job_id, ds_id])?;
        Ok(())
    }

    /// Store one annotation's metrics; `iso_image_ids` is kept as a JSON array.
    pub fn insert_annotation(&self, job_id: i64, fdr: f64, msm: f64, iso_image_ids: &[String]) -> Result<(), StoreError> {
        let ids = serde_json::to_string(iso_image_ids)?;
        self.connection.execute(
            "INSERT INTO iso_image_metrics (job_id, fdr, msm, iso_image_ids) VALUES (?1, ?2, ?3, ?4)",
            params![job_id, fdr, msm, ids],
        )?;
        Ok(())
    }

    /// First ion image id of each annotation, ranked, at most `max_count` annotations.
    ///
    /// Annotations without images are skipped.
    pub fn read_ranked_image_ids(&self, ds_id: &str, max_count: usize) -> Result<Vec<String>, StoreError> {
        let rows: Result<Vec<Vec<String>>, _> = self
            .connection
            .prepare(ISO_IMAGE_SEL)?
            .query_map(params![ds_id, max_count as i64], |row| {
                let ids_str: String = row.get(0)?;
                match serde_json::from_str(&ids_str) {
                    Ok(value) => Ok(value),
                    Err(e) => Err(rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )),
                }
            })?
            .collect();

        Ok(rows?.into_iter().filter_map(|ids| ids.into_iter().next()).collect())
    }

    pub fn read_thumbnail(&self, ds_id: &str) -> Result<Option<String>, StoreError> {
        let row: Option<Option<String>> = self
            .connection
            .query_row(THUMB_SEL, params![ds_id], |row| row.get(0))
            .optional()?;
        match row {
            Some(thumbnail) => Ok(thumbnail),
            None => Err(StoreError::NotFound(format!("dataset {}", ds_id))),
        }
    }

    pub fn update_thumbnail(&self, ds_id: &str, image_id: &str) -> Result<(), StoreError> {
        let updated = self.connection.execute(THUMB_UPD, params![image_id, ds_id])?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("dataset {}", ds_id)));
        }
        Ok(())
    }
}

impl AnnotationSource for AnnotationDb {
    fn fetch_ranked_images(&self, ds_id: &str, max_count: usize) -> Result<Vec<String>, BoxError> {
        self.read_ranked_image_ids(ds_id, max_count).map_err(StoreError::into_boxed)
    }

    fn get_existing_thumbnail(&self, ds_id: &str) -> Result<Option<ImageHandle>, BoxError> {
        let thumbnail = self.read_thumbnail(ds_id).map_err(StoreError::into_boxed)?;
        Ok(thumbnail.map(ImageHandle))
    }

    fn set_thumbnail(&self, ds_id: &str, handle: &ImageHandle) -> Result<(), BoxError> {
        self.update_thumbnail(ds_id, handle.as_str()).map_err(StoreError::into_boxed)
    }
}
