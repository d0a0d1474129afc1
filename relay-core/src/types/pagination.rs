use serde::{Deserialize, Serialize};

/// Window over a prefix scan of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of entries returned
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Number of entries skipped first
    #[serde(default)]
    pub offset: usize,
    /// Ignore limit and offset and return everything
    #[serde(default)]
    pub all: bool,
}

const fn default_limit() -> usize {
    10
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
            all: false,
        }
    }
}

impl Pagination {
    /// Set the limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Return every entry
    pub fn get_all(mut self) -> Self {
        self.all = true;
        self
    }
}
