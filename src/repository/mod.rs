//! Record repositories.
//!
//! A [`Repository`] is a typed view over one collection. Whole-collection
//! CRUD works for any [`Record`](crate::Record); the tenant-scoped operations
//! require [`TenantScoped`](crate::TenantScoped) records and check ownership
//! before touching anything.

mod patch;
mod repository;

pub use patch::{into_patch, Patch};
pub use repository::Repository;
