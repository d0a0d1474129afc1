use derive_new::new;
use serde::{de::DeserializeOwned, Serialize};

use crate::db::{DbError, DbResult, PrefixIterator, DB};

/// Separator between the segments of a key
pub const KEY_SEPARATOR: &str = "-";

/// DB handle for storing data tied to a specific type/entity.
///
/// Key structure: ```<entity>-<segment>-<segment>...```
#[derive(Debug, Clone, new)]
pub struct TypedDB {
    entity: String,
    db: DB,
}

impl AsRef<DB> for TypedDB {
    fn as_ref(&self) -> &DB {
        &self.db
    }
}

impl TypedDB {
    /// Entity prefix of this handle
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Full key for the given segments
    pub fn key<S: AsRef<str>>(&self, segments: &[S]) -> String {
        let mut key = self.entity.clone();
        for segment in segments {
            key.push_str(KEY_SEPARATOR);
            key.push_str(segment.as_ref());
        }
        key
    }

    /// Prefix matching every key below the given segments. Ends with the
    /// separator so `chain-1` does not match `chain-10`.
    pub fn scan_prefix<S: AsRef<str>>(&self, segments: &[S]) -> String {
        let mut prefix = self.key(segments);
        prefix.push_str(KEY_SEPARATOR);
        prefix
    }

    /// Store a value as JSON
    pub fn store_json<V: Serialize>(&self, key: &str, value: &V) -> DbResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|source| DbError::Serialization {
            key: key.to_owned(),
            source,
        })?;
        self.db.store(key.as_bytes(), &bytes)
    }

    /// Retrieve a JSON value
    pub fn retrieve_json<V: DeserializeOwned>(&self, key: &str) -> DbResult<Option<V>> {
        self.db
            .retrieve(key.as_bytes())?
            .map(|bytes| decode(key.as_bytes(), &bytes))
            .transpose()
    }

    /// Delete a key
    pub fn delete(&self, key: &str) -> DbResult<()> {
        self.db.delete(key.as_bytes())
    }

    /// Iterate raw entries below a prefix
    pub fn prefix_iterator<'a>(&'a self, prefix: &'a str) -> PrefixIterator<'a> {
        self.db.prefix_iterator(prefix.as_bytes())
    }
}

/// Decode a JSON value read from the DB
pub(crate) fn decode<V: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> DbResult<V> {
    serde_json::from_slice(bytes).map_err(|source| DbError::Serialization {
        key: String::from_utf8_lossy(key).into_owned(),
        source,
    })
}
