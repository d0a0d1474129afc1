use std::path::PathBuf;
use std::{io, path::Path, sync::Arc};

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB as Rocks};
use tracing::{debug, info};

pub use iterator::*;
pub use stores::*;
pub use typed_db::*;

/// Prefix scans over rocksdb
mod iterator;
/// The block-height, pending-message and finality stores
mod stores;
/// Entity scoped key handling
mod typed_db;

/// Database test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[derive(Debug, Clone)]
/// A KV Store
pub struct DB(Arc<Rocks>);

impl From<Rocks> for DB {
    fn from(rocks: Rocks) -> Self {
        Self(Arc::new(rocks))
    }
}

/// DB Error type
#[derive(thiserror::Error, Debug)]
pub enum DbError {
    /// Rocks DB Error
    #[error("{0}")]
    RockError(#[from] rocksdb::Error),
    #[error("Failed to open {path}, canonicalized as {canonicalized}: {source}")]
    /// Error opening the database
    OpeningError {
        /// Rocksdb error during opening
        #[source]
        source: rocksdb::Error,
        /// Raw database path provided
        path: PathBuf,
        /// Parsed path used
        canonicalized: PathBuf,
    },
    /// Could not parse the provided database path string
    #[error("Invalid database path supplied {1:?}; {0}")]
    InvalidDbPath(#[source] io::Error, String),
    /// A stored value could not be (de)serialized
    #[error("Failed to (de)serialize value for key {key}: {source}")]
    Serialization {
        /// Key of the entry
        key: String,
        /// Serde error
        #[source]
        source: serde_json::Error,
    },
    /// No entry under the key
    #[error("Key not found: {0}")]
    NotFound(String),
    /// Paging past the end of a scan
    #[error("no message after offset {offset}, only {available} entries stored")]
    OffsetOutOfRange {
        /// Requested offset
        offset: usize,
        /// Number of entries under the prefix
        available: usize,
    },
}

/// Result of a database operation
pub type DbResult<T> = std::result::Result<T, DbError>;

impl DB {
    /// Opens db at `db_path` and creates if missing
    #[tracing::instrument(err)]
    pub fn from_path(db_path: &Path) -> DbResult<DB> {
        let path = {
            let mut path = db_path
                .parent()
                .unwrap_or(Path::new("."))
                .canonicalize()
                .map_err(|e| DbError::InvalidDbPath(e, db_path.to_string_lossy().into()))?;
            if let Some(file_name) = db_path.file_name() {
                path.push(file_name);
            }
            path
        };

        if path.is_dir() {
            info!(path=%path.to_string_lossy(), "Opening existing db")
        } else {
            info!(path=%path.to_string_lossy(), "Creating db")
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);

        Rocks::open(&opts, &path)
            .map_err(|e| DbError::OpeningError {
                source: e,
                path: db_path.into(),
                canonicalized: path,
            })
            .map(Into::into)
    }

    /// Store a value in the DB
    pub fn store(&self, key: &[u8], value: &[u8]) -> DbResult<()> {
        Ok(self.0.put(key, value)?)
    }

    /// Retrieve a value from the DB
    pub fn retrieve(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.0.get(key)?)
    }

    /// Delete a value from the DB. Deleting a missing key is not an error.
    pub fn delete(&self, key: &[u8]) -> DbResult<()> {
        Ok(self.0.delete(key)?)
    }

    /// Iterate all entries whose key starts with `prefix`, in key order
    pub fn prefix_iterator<'a>(&'a self, prefix: &'a [u8]) -> PrefixIterator<'a> {
        let iter = self
            .0
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        PrefixIterator::new(iter, prefix)
    }

    /// Remove every entry of the DB
    pub fn clear(&self) -> DbResult<()> {
        let mut batch = WriteBatch::default();
        let mut count = 0usize;
        for entry in self.0.iterator(IteratorMode::Start) {
            let (key, _) = entry?;
            batch.delete(key);
            count += 1;
        }
        self.0.write(batch)?;
        debug!(count, "Cleared db");
        Ok(())
    }
}
