//! Cascade deletion of a tenant.
//!
//! Dependent collections are emptied of the tenant's records one at a time,
//! and the tenant record goes last. There is no transaction spanning the
//! collections: an interrupted cascade leaves the tenant visible with some
//! collections already cleaned, and running it again finishes the job since
//! every step is idempotent.

use crate::collections::{validate_collection_name, CollectionStore};
use crate::error::{Result, StoreError};
use crate::repository::Repository;
use crate::types::{Document, Record, RecordId, Tenant, TenantId, STORES_COLLECTION};
use std::sync::Arc;
use tracing::{info, warn};

/// Tenant-scoped collections cleaned when a tenant is deleted.
pub const DEFAULT_TENANT_COLLECTIONS: &[&str] = &[
    "products",
    "snapshots",
    "daily_sales",
    "forum_posts",
    "forum_comments",
    "voc_entries",
    "legal_entities",
    "account_health",
];

/// Guard applied before a cascade starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Any tenant may be deleted.
    #[default]
    Unrestricted,
    /// Refuse to delete the only remaining active tenant.
    ProtectLastActive,
}

/// What a cascade removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CascadeReport {
    pub tenant_id: TenantId,
    /// Records removed per dependent collection, in registry order.
    pub deleted: Vec<(String, usize)>,
    /// Whether the tenant record itself was removed by this run.
    pub tenant_removed: bool,
}

impl CascadeReport {
    /// Dependent records removed across all collections.
    pub fn total(&self) -> usize {
        self.deleted.iter().map(|(_, n)| n).sum()
    }

    pub fn deleted_from(&self, collection: &str) -> usize {
        self.deleted
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    /// True when the run found nothing left to delete.
    pub fn is_noop(&self) -> bool {
        !self.tenant_removed && self.total() == 0
    }
}

/// Deletes tenants along with their records in a fixed set of collections.
#[derive(Clone, Debug)]
pub struct CascadeCoordinator {
    collections: Vec<String>,
    policy: DeletePolicy,
}

impl Default for CascadeCoordinator {
    fn default() -> Self {
        Self {
            collections: DEFAULT_TENANT_COLLECTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            policy: DeletePolicy::default(),
        }
    }
}

impl CascadeCoordinator {
    /// Build a coordinator over `collections`.
    ///
    /// Names must be valid collection names and may not include the tenant
    /// collection itself. Duplicates are dropped, order is kept.
    pub fn new<I, S>(collections: I, policy: DeletePolicy) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry: Vec<String> = Vec::new();
        for name in collections {
            let name = name.into();
            validate_collection_name(&name)?;
            if name == STORES_COLLECTION {
                return Err(StoreError::InvalidCollectionName(format!(
                    "{} cannot be a dependent collection",
                    name
                )));
            }
            if !registry.contains(&name) {
                registry.push(name);
            }
        }
        Ok(Self {
            collections: registry,
            policy,
        })
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    pub fn policy(&self) -> DeletePolicy {
        self.policy
    }

    /// Delete `tenant` and every record it owns in the registered collections.
    ///
    /// Safe to call again after a partial failure or on a tenant that is
    /// already gone; later runs report zero for whatever was already removed.
    pub fn delete_tenant(
        &self,
        store: &Arc<CollectionStore>,
        tenant: &TenantId,
    ) -> Result<CascadeReport> {
        if self.policy == DeletePolicy::ProtectLastActive {
            let tenants = Repository::<Tenant>::new(Arc::clone(store), STORES_COLLECTION)?;
            Self::ensure_not_last_active(&tenants, tenant)?;
        }

        let mut deleted = Vec::with_capacity(self.collections.len());
        for name in &self.collections {
            let repo = Repository::<Document>::new(Arc::clone(store), name.as_str())?;
            let removed = repo.delete_all_for_tenant(tenant).map_err(|e| {
                warn!(%tenant, collection = %name, error = %e, "cascade interrupted");
                e
            })?;
            if removed > 0 {
                info!(%tenant, collection = %name, removed, "removed tenant records");
            }
            deleted.push((name.clone(), removed));
        }

        // Schemaless, so a tenant row another writer left malformed cannot
        // block its own removal.
        let stores = Repository::<Document>::new(Arc::clone(store), STORES_COLLECTION)?;
        let tenant_removed = stores.delete(&RecordId::from(tenant.as_str()))?;

        let report = CascadeReport {
            tenant_id: tenant.clone(),
            deleted,
            tenant_removed,
        };
        info!(
            %tenant,
            records = report.total(),
            tenant_removed,
            "tenant cascade complete"
        );
        Ok(report)
    }

    fn ensure_not_last_active(tenants: &Repository<Tenant>, tenant: &TenantId) -> Result<()> {
        let all = tenants.find_all()?;
        let target_active = all
            .iter()
            .any(|t| t.record_id() == Some(tenant.as_str()) && t.is_active);
        let active = all.iter().filter(|t| t.is_active).count();

        if target_active && active == 1 {
            return Err(StoreError::LastActiveTenant(tenant.clone()));
        }
        Ok(())
    }
}
