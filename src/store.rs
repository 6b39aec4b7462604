//! JSON-backed article store.
//!
//! The whole store is one JSON array of [`ArticleRecord`]s, loaded fully at
//! start and rewritten fully on save. Output is pretty-printed with a
//! 2-space indent and keeps non-ASCII text literal, so the file stays
//! readable when it is full of Cyrillic.
//!
//! Writes go to a sibling `*.tmp` file which is then renamed over the target,
//! so a failed save leaves the previous store intact.

use crate::models::ArticleRecord;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Default store file, relative to the working directory.
pub const DEFAULT_STORE_FILE: &str = "articles.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store {} is not a valid article array: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode articles: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Where article records are kept between runs.
pub trait ArticleStore {
    /// All previously saved records, in insertion order.
    async fn load(&self) -> Result<Vec<ArticleRecord>, StoreError>;

    /// Replace the stored sequence with `records`.
    async fn save(&self, records: &[ArticleRecord]) -> Result<(), StoreError>;
}

/// [`ArticleStore`] backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl ArticleStore for JsonFileStore {
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Vec<ArticleRecord>, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Store file not found; starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        let records: Vec<ArticleRecord> =
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        info!(count = records.len(), "Loaded stored articles");
        Ok(records)
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = records.len()))]
    async fn save(&self, records: &[ArticleRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records).map_err(StoreError::Encode)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(parent, e))?;
        }

        let tmp = self.tmp_path();
        debug!(tmp = %tmp.display(), bytes = json.len(), "Writing temporary store file");
        fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(&tmp, e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(&self.path, e))?;

        info!("Wrote article store");
        Ok(())
    }
}
