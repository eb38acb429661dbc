use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ioncore::generate::ThumbnailSettings;

use crate::error::StoreError;

/// Read generation settings from a JSON file. Missing keys keep their defaults.
pub fn load_settings(path: &Path) -> Result<ThumbnailSettings, StoreError> {
    let reader = BufReader::new(File::open(path)?);
    let settings = serde_json::from_reader(reader)?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_size": [64, 32], "kmeans": {{"n_init": 2}}}}"#).unwrap();

        let settings = load_settings(file.path()).unwrap();
        assert_eq!(settings.max_size, (64, 32));
        assert_eq!(settings.kmeans.n_init, 2);
        assert_eq!(settings.hotspot_percentile, 90);
    }

    #[test]
    fn test_load_invalid_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(load_settings(file.path()), Err(StoreError::Json(_))));
    }
}
