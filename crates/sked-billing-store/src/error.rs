//! Error types for sked-billing storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Its identifier.
        id: String,
    },

    /// A record with this identifier already exists.
    #[error("{entity} {id} already exists")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Its identifier.
        id: String,
    },

    /// The stored version differs from the one the caller read.
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict {
        /// Version the caller read.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },
}

impl StoreError {
    /// Whether the caller should reload and retry.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}
