//! Database handle tying the collection store, repositories and cascade together.

use crate::collections::{CollectionStats, CollectionStore};
use crate::error::{Result, StoreError};
use crate::repository::Repository;
use crate::tenants::{
    CascadeCoordinator, CascadeReport, DeletePolicy, TenantLookup, TenantStatus,
    DEFAULT_TENANT_COLLECTIONS,
};
use crate::types::{Document, Record, RecordId, Tenant, TenantId, STORES_COLLECTION};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Database configuration.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    /// Directory holding one JSON file per collection.
    pub path: PathBuf,

    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Pretty-print collection files.
    pub pretty: bool,

    /// fsync each collection file before it replaces the previous one.
    pub sync_writes: bool,

    /// Collections cleaned when a tenant is deleted.
    pub tenant_collections: Vec<String>,

    /// Guard applied before tenant deletion.
    pub delete_policy: DeletePolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data"),
            create_if_missing: true,
            pretty: true,
            sync_writes: true,
            tenant_collections: DEFAULT_TENANT_COLLECTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            delete_policy: DeletePolicy::Unrestricted,
        }
    }
}

impl DatabaseConfig {
    /// Default configuration rooted at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Per-collection record counts and I/O counters.
#[derive(Clone, Debug, Default)]
pub struct DatabaseStats {
    pub collections: Vec<(String, usize)>,
    pub tenant_count: usize,
    pub active_tenant_count: usize,
    pub io: CollectionStats,
}

/// Handle on a data directory.
///
/// Cheap to share behind an `Arc`; repositories handed out by it share the
/// same per-collection write locks.
pub struct Database {
    config: DatabaseConfig,
    store: Arc<CollectionStore>,
    cascade: CascadeCoordinator,
}

impl Database {
    /// Open a data directory, creating it if allowed.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        if !config.path.exists() {
            if !config.create_if_missing {
                return Err(StoreError::NotInitialized);
            }
            fs::create_dir_all(&config.path)?;
        }

        let cascade =
            CascadeCoordinator::new(config.tenant_collections.iter().cloned(), config.delete_policy)?;
        let store = Arc::new(
            CollectionStore::new(&config.path)
                .pretty(config.pretty)
                .sync_writes(config.sync_writes),
        );

        info!(
            path = %config.path.display(),
            tenant_collections = cascade.collections().len(),
            "opened database"
        );

        Ok(Self {
            config,
            store,
            cascade,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// The underlying collection store.
    pub fn store(&self) -> &Arc<CollectionStore> {
        &self.store
    }

    /// Typed repository over `collection`.
    pub fn collection<R: Record>(&self, collection: &str) -> Result<Repository<R>> {
        Repository::new(Arc::clone(&self.store), collection)
    }

    /// Schemaless repository over `collection`.
    pub fn documents(&self, collection: &str) -> Result<Repository<Document>> {
        self.collection(collection)
    }

    /// Repository over the tenant records.
    pub fn tenants(&self) -> Result<Repository<Tenant>> {
        self.collection(STORES_COLLECTION)
    }

    /// Delete a tenant and its records in every registered collection.
    pub fn delete_tenant(&self, tenant: &TenantId) -> Result<CascadeReport> {
        self.cascade.delete_tenant(&self.store, tenant)
    }

    pub fn cascade(&self) -> &CascadeCoordinator {
        &self.cascade
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        let mut collections = Vec::new();
        for name in self.store.collection_names()? {
            let count = self.documents(&name)?.count()?;
            collections.push((name, count));
        }

        let tenants = self.tenants()?.find_all()?;
        Ok(DatabaseStats {
            collections,
            tenant_count: tenants.len(),
            active_tenant_count: tenants.iter().filter(|t| t.is_active).count(),
            io: self.store.stats(),
        })
    }
}

impl TenantLookup for Database {
    fn tenant_status(&self, tenant: &TenantId) -> Result<TenantStatus> {
        let found = self
            .tenants()?
            .find_by_id(&RecordId::from(tenant.as_str()))?;
        Ok(TenantStatus::from_lookup(found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> DatabaseConfig {
        DatabaseConfig {
            sync_writes: false,
            ..DatabaseConfig::at(dir.path().join("data"))
        }
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(test_config(&dir)).unwrap();
        assert!(db.path().is_dir());
    }

    #[test]
    fn test_open_missing_without_create() {
        let dir = TempDir::new().unwrap();
        let result = Database::open(DatabaseConfig {
            create_if_missing: false,
            ..test_config(&dir)
        });
        assert!(matches!(result, Err(StoreError::NotInitialized)));
    }

    #[test]
    fn test_open_rejects_bad_registry() {
        let dir = TempDir::new().unwrap();
        let result = Database::open(DatabaseConfig {
            tenant_collections: vec!["products".into(), "stores".into()],
            ..test_config(&dir)
        });
        assert!(matches!(result, Err(StoreError::InvalidCollectionName(_))));
    }

    #[test]
    fn test_tenant_status() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(test_config(&dir)).unwrap();
        let tenants = db.tenants().unwrap();
        tenants.create(Tenant::with_id("s1", "Open")).unwrap();
        tenants
            .create(Tenant::with_id("s2", "Closed").inactive())
            .unwrap();

        assert!(db.tenant_status(&TenantId::from("s1")).unwrap().is_active());
        let closed = db.tenant_status(&TenantId::from("s2")).unwrap();
        assert!(closed.exists() && !closed.is_active());
        assert_eq!(
            db.tenant_status(&TenantId::from("s3")).unwrap(),
            TenantStatus::Unknown
        );
    }

    #[test]
    fn test_stats() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(test_config(&dir)).unwrap();
        db.tenants().unwrap().create(Tenant::new("Shop")).unwrap();
        db.documents("products")
            .unwrap()
            .create(Document::new().with("store_id", "x"))
            .unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(
            stats.collections,
            vec![("products".to_string(), 1), ("stores".to_string(), 1)]
        );
        assert_eq!(stats.tenant_count, 1);
        assert_eq!(stats.active_tenant_count, 1);
        // Each collection: one write to initialize it, one for the record.
        assert_eq!(stats.io.writes, 4);
        assert_eq!(stats.io.degraded_reads, 0);
    }
}
