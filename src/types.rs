//! Core types for the tenant store.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field holding a record's id.
pub const ID_FIELD: &str = "id";

/// Field holding the owning tenant of a tenant-scoped record.
pub const TENANT_FIELD: &str = "store_id";

/// Collection holding the tenant records themselves.
pub const STORES_COLLECTION: &str = "stores";

/// Unique identifier for a record within its collection.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// A fresh random id.
    pub fn generate() -> Self {
        RecordId(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

/// Identifier of a tenant ("store"); the partition key of scoped collections.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({})", self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        TenantId(s)
    }
}

impl From<&RecordId> for TenantId {
    fn from(id: &RecordId) -> Self {
        TenantId(id.0.clone())
    }
}

/// A record that can live in a collection.
///
/// The store only relies on the id accessors; everything else about the
/// record's shape belongs to the caller.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The record's id, or `None` if none has been assigned yet.
    fn record_id(&self) -> Option<&str>;

    fn set_record_id(&mut self, id: RecordId);

    fn has_id(&self, id: &RecordId) -> bool {
        self.record_id() == Some(id.as_str())
    }
}

/// A record partitioned by tenant through its `store_id`.
pub trait TenantScoped: Record {
    fn tenant_id(&self) -> Option<&str>;

    fn set_tenant_id(&mut self, tenant: &TenantId);

    fn belongs_to(&self, tenant: &TenantId) -> bool {
        self.tenant_id() == Some(tenant.as_str())
    }
}

/// Schemaless record: a flat JSON object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Document(map)
    }
}

impl TryFrom<Value> for Document {
    type Error = Value;

    /// Fails with the original value unless it is a JSON object.
    fn try_from(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Object(map) => Ok(Document(map)),
            other => Err(other),
        }
    }
}

impl Record for Document {
    fn record_id(&self) -> Option<&str> {
        self.0
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    fn set_record_id(&mut self, id: RecordId) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.0));
    }
}

impl TenantScoped for Document {
    fn tenant_id(&self) -> Option<&str> {
        self.0.get(TENANT_FIELD).and_then(Value::as_str)
    }

    fn set_tenant_id(&mut self, tenant: &TenantId) {
        self.0
            .insert(TENANT_FIELD.to_string(), Value::String(tenant.0.clone()));
    }
}

fn default_active() -> bool {
    true
}

/// A tenant ("store") record in the `stores` collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    #[serde(default)]
    pub id: RecordId,

    #[serde(default)]
    pub name: String,

    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Descriptive fields the store does not interpret.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Tenant {
    /// New active tenant; the id is assigned on create.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::default(),
            name: name.into(),
            is_active: true,
            attributes: Map::new(),
        }
    }

    /// New tenant with a caller-chosen id.
    pub fn with_id(id: impl Into<RecordId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::new(name)
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn tenant_id(&self) -> TenantId {
        TenantId::from(&self.id)
    }
}

impl Record for Tenant {
    fn record_id(&self) -> Option<&str> {
        (!self.id.is_empty()).then(|| self.id.as_str())
    }

    fn set_record_id(&mut self, id: RecordId) {
        self.id = id;
    }
}
