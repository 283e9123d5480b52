//! Tenant lifecycle and access.
//!
//! - Cascade deletion of a tenant across its dependent collections
//! - The tenant lookup contract used by request validation
//! - Ordered extraction of a tenant id from an incoming request

mod access;
mod cascade;

pub use access::{
    AccessError, RequestView, TenantContext, TenantLookup, TenantResolver, TenantSource,
    TenantStatus, STORE_ID_HEADER, STORE_ID_PARAM,
};
pub use cascade::{CascadeCoordinator, CascadeReport, DeletePolicy, DEFAULT_TENANT_COLLECTIONS};
