//! # Tenant Store
//!
//! A JSON-file-backed record store for multi-tenant data, where every
//! tenant-scoped operation is confined to the records of one tenant.
//!
//! ## Core Concepts
//!
//! - **Collections**: Named arrays of records, one JSON file each
//! - **Repositories**: Typed CRUD over a collection, plus tenant-scoped
//!   variants that refuse to see or touch another tenant's records
//! - **Tenants**: Records of the `stores` collection; deleting one cascades
//!   through a registry of dependent collections
//! - **Pagination**: Page slicing with metadata for list responses
//!
//! ## Example
//!
//! ```ignore
//! use tenantdb::{Database, DatabaseConfig, Document, Tenant, TenantId};
//!
//! let db = Database::open(DatabaseConfig::at("./data"))?;
//!
//! let shop = db.tenants()?.create(Tenant::new("Seoul Flagship"))?;
//! let tenant = shop.tenant_id();
//!
//! let products = db.documents("products")?;
//! products.bulk_create_scoped(&tenant, vec![
//!     Document::new().with("name", "Mug").with("price", 12),
//! ])?;
//!
//! let page = products.find_by_tenant_page(&tenant, 1, 20)?;
//!
//! // Removes the tenant's products, sales, posts, ... and finally the tenant.
//! let report = db.delete_tenant(&tenant)?;
//! ```

pub mod collections;
pub mod database;
pub mod error;
pub mod pagination;
pub mod repository;
pub mod tenants;
pub mod types;

// Re-exports
pub use collections::{
    CollectionRead, CollectionStats, CollectionStore, Commit, DegradedRead, ReadStatus,
};
pub use database::{Database, DatabaseConfig, DatabaseStats};
pub use error::{Result, StoreError};
pub use pagination::{paginate, Page, PageInfo};
pub use repository::{into_patch, Patch, Repository};
pub use tenants::{
    AccessError, CascadeCoordinator, CascadeReport, DeletePolicy, RequestView, TenantContext,
    TenantLookup, TenantResolver, TenantSource, TenantStatus, DEFAULT_TENANT_COLLECTIONS,
};
pub use types::*;
