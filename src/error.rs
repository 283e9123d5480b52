//! Error types for the tenant store.

use crate::types::{RecordId, TenantId};
use thiserror::Error;

/// Main error type for store operations.
///
/// Lookups that miss (including tenant-scoped lookups of a foreign record) are
/// not errors: they surface as `None` or `false` so the caller decides how to
/// map them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to persist collection {collection}: {source}")]
    Storage {
        collection: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid collection name: {0:?}")]
    InvalidCollectionName(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Duplicate id {id} in collection {collection}")]
    DuplicateId { collection: String, id: RecordId },

    #[error("Refusing to delete the last active tenant: {0}")]
    LastActiveTenant(TenantId),

    #[error("Data directory not initialized")]
    NotInitialized,
}

impl StoreError {
    pub(crate) fn storage(collection: &str, source: std::io::Error) -> Self {
        StoreError::Storage {
            collection: collection.to_string(),
            source,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
