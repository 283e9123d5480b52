//! Tenant lookup for request validation.
//!
//! The HTTP layer owns request parsing; it exposes what it parsed through
//! [`RequestView`], and a [`TenantResolver`] walks its extractors in order
//! until one yields a non-empty tenant id.

use crate::error::StoreError;
use crate::types::{Tenant, TenantId};
use thiserror::Error;
use tracing::debug;

/// Name of the path, body and query parameter carrying the tenant id.
pub const STORE_ID_PARAM: &str = "storeId";

/// Header carrying the tenant id.
pub const STORE_ID_HEADER: &str = "x-store-id";

/// Whether a tenant exists and may be served.
#[derive(Clone, Debug, PartialEq)]
pub enum TenantStatus {
    Active(Tenant),
    Inactive(Tenant),
    Unknown,
}

impl TenantStatus {
    pub fn from_lookup(tenant: Option<Tenant>) -> Self {
        match tenant {
            Some(t) if t.is_active => TenantStatus::Active(t),
            Some(t) => TenantStatus::Inactive(t),
            None => TenantStatus::Unknown,
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self, TenantStatus::Unknown)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TenantStatus::Active(_))
    }

    pub fn tenant(&self) -> Option<&Tenant> {
        match self {
            TenantStatus::Active(t) | TenantStatus::Inactive(t) => Some(t),
            TenantStatus::Unknown => None,
        }
    }
}

/// Answers "does this tenant exist, and is it active".
pub trait TenantLookup {
    fn tenant_status(&self, tenant: &TenantId) -> crate::Result<TenantStatus>;
}

/// Read access to the parts of a request a tenant id can come from.
pub trait RequestView {
    fn path_param(&self, name: &str) -> Option<&str>;
    fn body_field(&self, name: &str) -> Option<&str>;
    fn query_param(&self, name: &str) -> Option<&str>;
    fn header(&self, name: &str) -> Option<&str>;
}

/// Where a tenant id was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TenantSource {
    PathParam,
    BodyField,
    QueryParam,
    Header,
    Custom(&'static str),
}

/// Tenant attached to a request once it passed validation.
#[derive(Clone, Debug, PartialEq)]
pub struct TenantContext {
    pub tenant: Tenant,
    pub source: TenantSource,
}

impl TenantContext {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant.tenant_id()
    }
}

/// Why a request was refused a tenant context.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("No tenant id in request")]
    MissingTenant,

    #[error("Unknown tenant: {0}")]
    UnknownTenant(TenantId),

    #[error("Tenant is not active: {0}")]
    InactiveTenant(TenantId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

type Extractor = Box<dyn Fn(&dyn RequestView) -> Option<String> + Send + Sync>;

/// Ordered chain of tenant id extractors; the first non-empty value wins.
pub struct TenantResolver {
    extractors: Vec<(TenantSource, Extractor)>,
}

impl Default for TenantResolver {
    /// Path parameter, then body field, then query parameter, then header.
    fn default() -> Self {
        Self::empty()
            .with_extractor(TenantSource::PathParam, |req| {
                req.path_param(STORE_ID_PARAM).map(str::to_string)
            })
            .with_extractor(TenantSource::BodyField, |req| {
                req.body_field(STORE_ID_PARAM).map(str::to_string)
            })
            .with_extractor(TenantSource::QueryParam, |req| {
                req.query_param(STORE_ID_PARAM).map(str::to_string)
            })
            .with_extractor(TenantSource::Header, |req| {
                req.header(STORE_ID_HEADER).map(str::to_string)
            })
    }
}

impl TenantResolver {
    /// A resolver with no extractors.
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Append an extractor to the end of the chain.
    pub fn with_extractor<F>(mut self, source: TenantSource, extractor: F) -> Self
    where
        F: Fn(&dyn RequestView) -> Option<String> + Send + Sync + 'static,
    {
        self.extractors.push((source, Box::new(extractor)));
        self
    }

    /// First non-blank tenant id in chain order.
    pub fn resolve(&self, request: &dyn RequestView) -> Option<(TenantSource, TenantId)> {
        self.extractors.iter().find_map(|(source, extract)| {
            extract(request)
                .map(|raw| raw.trim().to_string())
                .filter(|id| !id.is_empty())
                .map(|id| (*source, TenantId::from(id)))
        })
    }

    /// Resolve the tenant id and check that the tenant exists and is active.
    pub fn authorize(
        &self,
        lookup: &impl TenantLookup,
        request: &dyn RequestView,
    ) -> Result<TenantContext, AccessError> {
        let (source, tenant_id) = self.resolve(request).ok_or(AccessError::MissingTenant)?;

        match lookup.tenant_status(&tenant_id)? {
            TenantStatus::Active(tenant) => {
                debug!(tenant = %tenant_id, ?source, "tenant authorized");
                Ok(TenantContext { tenant, source })
            }
            TenantStatus::Inactive(_) => Err(AccessError::InactiveTenant(tenant_id)),
            TenantStatus::Unknown => Err(AccessError::UnknownTenant(tenant_id)),
        }
    }
}
