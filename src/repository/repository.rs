//! Typed CRUD over one collection.

use super::patch::{apply_patch, Patch};
use crate::collections::{CollectionRead, CollectionStore, Commit};
use crate::error::{Result, StoreError};
use crate::pagination::{paginate, Page};
use crate::types::{Record, RecordId, TenantId, TenantScoped, ID_FIELD, TENANT_FIELD};
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Typed handle on a single collection.
///
/// Every call is one read (or one locked read-modify-write) of the backing
/// file; the handle itself holds no records.
pub struct Repository<R> {
    collection: String,
    store: Arc<CollectionStore>,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            store: Arc::clone(&self.store),
            _record: PhantomData,
        }
    }
}

impl<R> fmt::Debug for Repository<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &self.collection)
            .finish()
    }
}

/// Give `record` an id that is not in `taken`, or reject the one it carries.
fn claim_id<R: Record>(collection: &str, taken: &mut HashSet<String>, record: &mut R) -> Result<()> {
    match record.record_id() {
        Some(id) => {
            if !taken.insert(id.to_string()) {
                return Err(StoreError::DuplicateId {
                    collection: collection.to_string(),
                    id: RecordId::from(id),
                });
            }
        }
        None => {
            let id = loop {
                let candidate = RecordId::generate();
                if taken.insert(candidate.0.clone()) {
                    break candidate;
                }
            };
            record.set_record_id(id);
        }
    }
    Ok(())
}

fn taken_ids<R: Record>(records: &[R]) -> HashSet<String> {
    records
        .iter()
        .filter_map(|r| r.record_id().map(str::to_string))
        .collect()
}

impl<R: Record> Repository<R> {
    pub fn new(store: Arc<CollectionStore>, collection: impl Into<String>) -> Result<Self> {
        let collection = collection.into();
        crate::collections::validate_collection_name(&collection)?;
        Ok(Self {
            collection,
            store,
            _record: PhantomData,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// All records along with how the read went.
    pub fn read(&self) -> Result<CollectionRead<R>> {
        self.store.read_all(&self.collection)
    }

    pub fn find_all(&self) -> Result<Vec<R>> {
        Ok(self.read()?.records)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.read()?.records.len())
    }

    pub fn find_by_id(&self, id: &RecordId) -> Result<Option<R>> {
        Ok(self.read()?.records.into_iter().find(|r| r.has_id(id)))
    }

    /// Records matching `predicate`, in collection order.
    pub fn find_where(&self, predicate: impl Fn(&R) -> bool) -> Result<Vec<R>> {
        Ok(self
            .read()?
            .records
            .into_iter()
            .filter(|r| predicate(r))
            .collect())
    }

    /// Append a record, assigning an id if it has none.
    ///
    /// A caller-supplied id that is already taken is rejected.
    pub fn create(&self, mut record: R) -> Result<R> {
        let collection = self.collection.as_str();
        self.store.mutate(collection, |records: &mut Vec<R>| {
            let mut taken = taken_ids(records);
            claim_id(collection, &mut taken, &mut record)?;
            records.push(record.clone());
            Ok(Commit::Write(record))
        })
    }

    /// Shallow-merge `patch` into the record with `id`.
    ///
    /// Returns `None` without writing when no record has that id. The id
    /// itself cannot be patched.
    pub fn update(&self, id: &RecordId, patch: &Patch) -> Result<Option<R>> {
        self.store.mutate(&self.collection, |records: &mut Vec<R>| {
            let Some(pos) = records.iter().position(|r| r.has_id(id)) else {
                return Ok(Commit::Discard(None));
            };
            let mut merged = apply_patch(&records[pos], patch, &[ID_FIELD])?;
            merged.set_record_id(id.clone());
            records[pos] = merged.clone();
            Ok(Commit::Write(Some(merged)))
        })
    }

    /// Remove the record with `id`. Returns whether one was removed.
    pub fn delete(&self, id: &RecordId) -> Result<bool> {
        self.store.mutate(&self.collection, |records: &mut Vec<R>| {
            match records.iter().position(|r| r.has_id(id)) {
                Some(pos) => {
                    records.remove(pos);
                    Ok(Commit::Write(true))
                }
                None => Ok(Commit::Discard(false)),
            }
        })
    }
}

impl<R: TenantScoped> Repository<R> {
    /// Records owned by `tenant`, in collection order.
    pub fn find_by_tenant(&self, tenant: &TenantId) -> Result<Vec<R>> {
        self.find_where(|r| r.belongs_to(tenant))
    }

    pub fn count_for_tenant(&self, tenant: &TenantId) -> Result<usize> {
        Ok(self.find_by_tenant(tenant)?.len())
    }

    /// The record with `id` if `tenant` owns it; a foreign record reads as absent.
    pub fn find_by_id_scoped(&self, id: &RecordId, tenant: &TenantId) -> Result<Option<R>> {
        Ok(self
            .read()?
            .records
            .into_iter()
            .find(|r| r.has_id(id) && r.belongs_to(tenant)))
    }

    pub fn find_by_tenant_page(
        &self,
        tenant: &TenantId,
        page: usize,
        limit: usize,
    ) -> Result<Page<R>> {
        Ok(paginate(self.find_by_tenant(tenant)?, page, limit))
    }

    /// Shallow-merge `patch` into the record with `id`, only if `tenant` owns it.
    ///
    /// Missing and foreign ids both return `None` and leave the file
    /// untouched. Neither `id` nor `store_id` can be patched.
    pub fn update_scoped(
        &self,
        id: &RecordId,
        tenant: &TenantId,
        patch: &Patch,
    ) -> Result<Option<R>> {
        let collection = self.collection.as_str();
        self.store.mutate(collection, |records: &mut Vec<R>| {
            let Some(pos) = records
                .iter()
                .position(|r| r.has_id(id) && r.belongs_to(tenant))
            else {
                debug!(collection, %id, %tenant, "scoped update matched nothing");
                return Ok(Commit::Discard(None));
            };
            let mut merged = apply_patch(&records[pos], patch, &[ID_FIELD, TENANT_FIELD])?;
            merged.set_record_id(id.clone());
            merged.set_tenant_id(tenant);
            records[pos] = merged.clone();
            Ok(Commit::Write(Some(merged)))
        })
    }

    /// Remove the record with `id` only if `tenant` owns it.
    pub fn delete_scoped(&self, id: &RecordId, tenant: &TenantId) -> Result<bool> {
        let collection = self.collection.as_str();
        self.store.mutate(collection, |records: &mut Vec<R>| {
            match records
                .iter()
                .position(|r| r.has_id(id) && r.belongs_to(tenant))
            {
                Some(pos) => {
                    records.remove(pos);
                    Ok(Commit::Write(true))
                }
                None => {
                    debug!(collection, %id, %tenant, "scoped delete matched nothing");
                    Ok(Commit::Discard(false))
                }
            }
        })
    }

    /// Append `inputs` as records of `tenant` in a single write.
    ///
    /// Every record's `store_id` is overwritten with `tenant`. If any
    /// caller-supplied id is taken, nothing is written.
    pub fn bulk_create_scoped(&self, tenant: &TenantId, inputs: Vec<R>) -> Result<Vec<R>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let collection = self.collection.as_str();
        self.store.mutate(collection, |records: &mut Vec<R>| {
            let mut taken = taken_ids(records);
            let mut created = Vec::with_capacity(inputs.len());
            for mut record in inputs {
                record.set_tenant_id(tenant);
                claim_id(collection, &mut taken, &mut record)?;
                created.push(record);
            }
            records.extend(created.iter().cloned());
            Ok(Commit::Write(created))
        })
    }

    /// Remove those of `ids` that `tenant` owns; the rest are skipped.
    ///
    /// Returns how many records were removed.
    pub fn bulk_delete_scoped(&self, tenant: &TenantId, ids: &[RecordId]) -> Result<usize> {
        let wanted: HashSet<&str> = ids.iter().map(RecordId::as_str).collect();
        self.remove_where(|r| {
            r.belongs_to(tenant) && r.record_id().is_some_and(|id| wanted.contains(id))
        })
    }

    /// Remove every record of `tenant`. Returns the count removed; `0` once
    /// the tenant has nothing left here.
    pub fn delete_all_for_tenant(&self, tenant: &TenantId) -> Result<usize> {
        self.remove_where(|r| r.belongs_to(tenant))
    }

    fn remove_where(&self, doomed: impl Fn(&R) -> bool) -> Result<usize> {
        self.store.mutate(&self.collection, |records: &mut Vec<R>| {
            let before = records.len();
            records.retain(|r| !doomed(r));
            let removed = before - records.len();
            if removed == 0 {
                Ok(Commit::Discard(0))
            } else {
                Ok(Commit::Write(removed))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::into_patch;
    use crate::types::Document;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Product {
        #[serde(default)]
        id: RecordId,
        store_id: String,
        name: String,
        price: u32,
    }

    impl Record for Product {
        fn record_id(&self) -> Option<&str> {
            (!self.id.is_empty()).then(|| self.id.as_str())
        }

        fn set_record_id(&mut self, id: RecordId) {
            self.id = id;
        }
    }

    impl TenantScoped for Product {
        fn tenant_id(&self) -> Option<&str> {
            Some(&self.store_id)
        }

        fn set_tenant_id(&mut self, tenant: &TenantId) {
            self.store_id = tenant.0.clone();
        }
    }

    fn product(store: &str, name: &str, price: u32) -> Product {
        Product {
            id: RecordId::default(),
            store_id: store.to_string(),
            name: name.to_string(),
            price,
        }
    }

    fn test_repo<R: Record>(dir: &TempDir, collection: &str) -> Repository<R> {
        let store = Arc::new(CollectionStore::new(dir.path().join("data")));
        Repository::new(store, collection).unwrap()
    }

    fn s(id: &str) -> TenantId {
        TenantId::from(id)
    }

    #[test]
    fn test_create_assigns_id() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Product>(&dir, "products");

        let created = repo.create(product("s1", "Widget", 10)).unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(repo.find_by_id(&created.id).unwrap(), Some(created));
    }

    #[test]
    fn test_create_keeps_supplied_id_and_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Document>(&dir, "products");

        let created = repo.create(Document::new().with("id", "p1")).unwrap();
        assert_eq!(created.record_id(), Some("p1"));

        let result = repo.create(Document::new().with("id", "p1"));
        assert!(matches!(result, Err(StoreError::DuplicateId { .. })));
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_update_merges_and_misses() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Product>(&dir, "products");
        let p = repo.create(product("s1", "Widget", 10)).unwrap();

        let patch = into_patch(json!({"price": 5, "id": "hijack"})).unwrap();
        let updated = repo.update(&p.id, &patch).unwrap().unwrap();
        assert_eq!(updated.price, 5);
        assert_eq!(updated.name, "Widget");
        assert_eq!(updated.id, p.id);

        let missing = repo.update(&RecordId::from("nope"), &patch).unwrap();
        assert!(missing.is_none());
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Product>(&dir, "products");
        let p = repo.create(product("s1", "Widget", 10)).unwrap();

        assert!(repo.delete(&p.id).unwrap());
        assert!(!repo.delete(&p.id).unwrap());
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_scoped_update_refuses_foreign_record() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Product>(&dir, "products");
        let p1 = repo.create(product("s1", "Widget", 10)).unwrap();
        let p2 = repo.create(product("s2", "Gadget", 20)).unwrap();

        let patch = into_patch(json!({"price": 5})).unwrap();
        assert!(repo.update_scoped(&p2.id, &s("s1"), &patch).unwrap().is_none());
        assert_eq!(repo.find_by_id(&p2.id).unwrap(), Some(p2));

        let updated = repo.update_scoped(&p1.id, &s("s1"), &patch).unwrap().unwrap();
        assert_eq!(updated.price, 5);
    }

    #[test]
    fn test_scoped_update_cannot_move_record_between_tenants() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Product>(&dir, "products");
        let p = repo.create(product("s1", "Widget", 10)).unwrap();

        let patch = into_patch(json!({"store_id": "s2", "name": "Renamed"})).unwrap();
        let updated = repo.update_scoped(&p.id, &s("s1"), &patch).unwrap().unwrap();
        assert_eq!(updated.store_id, "s1");
        assert_eq!(updated.name, "Renamed");
        assert!(repo.find_by_tenant(&s("s2")).unwrap().is_empty());
    }

    #[test]
    fn test_scoped_delete() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Product>(&dir, "products");
        let p = repo.create(product("s1", "Widget", 10)).unwrap();

        assert!(!repo.delete_scoped(&p.id, &s("s2")).unwrap());
        assert!(!repo.delete_scoped(&RecordId::from("nope"), &s("s1")).unwrap());
        assert_eq!(repo.count().unwrap(), 1);

        assert!(repo.delete_scoped(&p.id, &s("s1")).unwrap());
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_find_by_id_scoped() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Product>(&dir, "products");
        let p = repo.create(product("s1", "Widget", 10)).unwrap();

        assert!(repo.find_by_id_scoped(&p.id, &s("s1")).unwrap().is_some());
        assert!(repo.find_by_id_scoped(&p.id, &s("s2")).unwrap().is_none());
    }

    #[test]
    fn test_bulk_create_stamps_tenant() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Product>(&dir, "products");

        let created = repo
            .bulk_create_scoped(
                &s("s1"),
                vec![product("s2", "A", 1), product("", "B", 2), product("s1", "C", 3)],
            )
            .unwrap();

        assert_eq!(created.len(), 3);
        assert!(created.iter().all(|p| p.store_id == "s1"));
        let ids: HashSet<_> = created.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(repo.count_for_tenant(&s("s1")).unwrap(), 3);
        assert_eq!(repo.count_for_tenant(&s("s2")).unwrap(), 0);
    }

    #[test]
    fn test_bulk_create_with_duplicate_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Document>(&dir, "products");

        let result = repo.bulk_create_scoped(
            &s("s1"),
            vec![Document::new().with("id", "x"), Document::new().with("id", "x")],
        );
        assert!(matches!(result, Err(StoreError::DuplicateId { .. })));
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_bulk_delete_skips_foreign_and_missing() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Product>(&dir, "products");
        let a = repo.create(product("s1", "A", 1)).unwrap();
        let b = repo.create(product("s1", "B", 2)).unwrap();
        let c = repo.create(product("s2", "C", 3)).unwrap();

        let removed = repo
            .bulk_delete_scoped(
                &s("s1"),
                &[a.id.clone(), c.id.clone(), RecordId::from("ghost")],
            )
            .unwrap();

        assert_eq!(removed, 1);
        assert!(repo.find_by_id(&a.id).unwrap().is_none());
        assert_eq!(repo.find_by_id(&b.id).unwrap(), Some(b));
        assert_eq!(repo.find_by_id(&c.id).unwrap(), Some(c));
    }

    #[test]
    fn test_delete_all_for_tenant_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Product>(&dir, "products");
        repo.create(product("s1", "A", 1)).unwrap();
        repo.create(product("s1", "B", 2)).unwrap();
        let other = repo.create(product("s2", "C", 3)).unwrap();

        assert_eq!(repo.delete_all_for_tenant(&s("s1")).unwrap(), 2);
        assert_eq!(repo.delete_all_for_tenant(&s("s1")).unwrap(), 0);
        assert_eq!(repo.find_by_tenant(&s("s2")).unwrap(), vec![other]);
    }

    #[test]
    fn test_find_by_tenant_page() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo::<Product>(&dir, "products");
        for i in 0..5 {
            repo.create(product("s1", &format!("P{}", i), i)).unwrap();
        }
        repo.create(product("s2", "Other", 99)).unwrap();

        let page = repo.find_by_tenant_page(&s("s1"), 2, 2).unwrap();
        let names: Vec<_> = page.data.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["P2", "P3"]);
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.total_pages, 3);
    }

    #[test]
    fn test_invalid_collection_name() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(CollectionStore::new(dir.path()));
        let result = Repository::<Document>::new(store, "../stores");
        assert!(matches!(result, Err(StoreError::InvalidCollectionName(_))));
    }
}
