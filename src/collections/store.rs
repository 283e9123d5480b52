//! File-backed collection store.

use crate::error::{Result, StoreError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Extension of collection files.
const COLLECTION_EXT: &str = "json";

/// Marker in the name of the copy kept of a corrupt collection file.
const QUARANTINE_MARKER: &str = "corrupt";

/// Why a read fell back to an empty collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DegradedRead {
    /// The file exists but is not a JSON array of records.
    Corrupt(String),
    /// The file could not be read or initialized.
    Unreadable(String),
}

impl fmt::Display for DegradedRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradedRead::Corrupt(reason) => write!(f, "corrupt: {}", reason),
            DegradedRead::Unreadable(reason) => write!(f, "unreadable: {}", reason),
        }
    }
}

/// How a collection read was satisfied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    /// Parsed from an existing file.
    Loaded,
    /// The file did not exist and was initialized to an empty array.
    Created,
    /// The file parsed, but some records do not decode as the requested
    /// type. They are left out of the read and kept on disk.
    Partial { skipped: usize, reason: String },
    /// The read failed and the collection is treated as empty.
    Degraded(DegradedRead),
}

/// Records of a collection together with how they were obtained.
#[derive(Clone, Debug)]
pub struct CollectionRead<R> {
    pub records: Vec<R>,
    pub status: ReadStatus,
}

impl<R> CollectionRead<R> {
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, ReadStatus::Degraded(_))
    }

    /// Records present in the file but missing from `records`.
    pub fn skipped(&self) -> usize {
        match self.status {
            ReadStatus::Partial { skipped, .. } => skipped,
            _ => 0,
        }
    }
}

/// Outcome of a [`CollectionStore::mutate`] closure.
pub enum Commit<T> {
    /// Persist the modified records, then return the value.
    Write(T),
    /// Leave the file untouched and return the value.
    Discard(T),
}

/// Counters for collection I/O.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub degraded_reads: u64,
    pub writes: u64,
    pub quarantined: u64,
    /// Records left out of reads because they did not decode.
    pub skipped_records: u64,
}

#[derive(Default)]
struct Counters {
    degraded_reads: AtomicU64,
    writes: AtomicU64,
    quarantined: AtomicU64,
    skipped_records: AtomicU64,
}

/// Check that a collection name maps to a single file inside the data directory.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollectionName(name.to_string()))
    }
}

/// Durable storage of named collections, one JSON file each.
pub struct CollectionStore {
    /// Data directory, created on first write.
    root: PathBuf,

    /// Pretty-print collection files.
    pretty: bool,

    /// fsync the temp file before it replaces the collection file.
    sync_writes: bool,

    /// One lock per collection name, held across read-modify-write.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,

    counters: Counters,
}

impl CollectionStore {
    /// Create a store rooted at `root`. Nothing touches the disk yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pretty: true,
            sync_writes: true,
            locks: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Backing file of a collection.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_collection_name(name)?;
        Ok(self.root.join(format!("{}.{}", name, COLLECTION_EXT)))
    }

    /// Read every record of a collection.
    ///
    /// A missing file is initialized to an empty array. A file that cannot be
    /// read or parsed yields an empty collection tagged as degraded; the
    /// failure is logged and counted, never returned.
    pub fn read_all<R>(&self, name: &str) -> Result<CollectionRead<R>>
    where
        R: Serialize + DeserializeOwned,
    {
        let path = self.path_for(name)?;
        let lock = self.lock_for(name);
        let _guard = lock.lock();
        Ok(self.load(name, &path))
    }

    /// Replace the whole contents of a collection.
    pub fn write_all<R: Serialize>(&self, name: &str, records: &[R]) -> Result<()> {
        let path = self.path_for(name)?;
        let lock = self.lock_for(name);
        let _guard = lock.lock();
        self.persist(name, &path, records)
    }

    /// Read-modify-write a collection under its lock.
    ///
    /// The closure sees the current records and decides whether the result is
    /// written back. An error from the closure leaves the file untouched.
    ///
    /// A write is refused with [`StoreError::InvalidRecord`] when the read
    /// skipped records that do not decode as `R`, since writing back `R`
    /// values would drop them.
    pub fn mutate<R, T, F>(&self, name: &str, f: F) -> Result<T>
    where
        R: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<R>) -> Result<Commit<T>>,
    {
        let path = self.path_for(name)?;
        let lock = self.lock_for(name);
        let _guard = lock.lock();

        let CollectionRead {
            mut records,
            status,
        } = self.load(name, &path);

        match f(&mut records)? {
            Commit::Discard(out) => Ok(out),
            Commit::Write(out) => {
                match &status {
                    ReadStatus::Partial { skipped, reason } => {
                        warn!(collection = name, skipped, "refusing write over undecodable records");
                        return Err(StoreError::InvalidRecord(format!(
                            "{} record(s) in {} do not match the record type ({}); not overwriting them",
                            skipped, name, reason
                        )));
                    }
                    ReadStatus::Degraded(DegradedRead::Corrupt(_)) => {
                        self.quarantine(name, &path)
                    }
                    _ => {}
                }
                self.persist(name, &path, &records)?;
                Ok(out)
            }
        }
    }

    /// Names of the collections that currently have a file, sorted.
    pub fn collection_names(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(COLLECTION_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_collection_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            degraded_reads: self.counters.degraded_reads.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            quarantined: self.counters.quarantined.load(Ordering::Relaxed),
            skipped_records: self.counters.skipped_records.load(Ordering::Relaxed),
        }
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Caller must hold the collection lock.
    fn load<R>(&self, name: &str, path: &Path) -> CollectionRead<R>
    where
        R: Serialize + DeserializeOwned,
    {
        let status = match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<Value>>(&bytes) {
                Ok(values) => return self.decode(name, values),
                Err(e) => DegradedRead::Corrupt(e.to_string()),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                match self.persist::<R>(name, path, &[]) {
                    Ok(()) => {
                        debug!(collection = name, "initialized empty collection");
                        return CollectionRead {
                            records: Vec::new(),
                            status: ReadStatus::Created,
                        };
                    }
                    Err(e) => DegradedRead::Unreadable(e.to_string()),
                }
            }
            Err(e) => DegradedRead::Unreadable(e.to_string()),
        };

        self.counters.degraded_reads.fetch_add(1, Ordering::Relaxed);
        warn!(
            collection = name,
            path = %path.display(),
            reason = %status,
            "degraded read, treating collection as empty"
        );

        CollectionRead {
            records: Vec::new(),
            status: ReadStatus::Degraded(status),
        }
    }

    /// Decode records one by one; those that do not fit `R` are skipped.
    fn decode<R: DeserializeOwned>(&self, name: &str, values: Vec<Value>) -> CollectionRead<R> {
        let mut records = Vec::with_capacity(values.len());
        let mut skipped = 0;
        let mut first_error = None;

        for (index, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<R>(value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    if first_error.is_none() {
                        first_error = Some(format!("record {}: {}", index, e));
                    }
                }
            }
        }

        let status = match first_error {
            None => ReadStatus::Loaded,
            Some(reason) => {
                self.counters
                    .skipped_records
                    .fetch_add(skipped as u64, Ordering::Relaxed);
                warn!(collection = name, skipped, %reason, "skipped undecodable records");
                ReadStatus::Partial { skipped, reason }
            }
        };
        CollectionRead { records, status }
    }

    /// Keep a copy of a corrupt file before it gets overwritten. Earlier
    /// copies are never replaced.
    fn quarantine(&self, name: &str, path: &Path) {
        match self.copy_aside(name, path) {
            Ok(target) => {
                self.counters.quarantined.fetch_add(1, Ordering::Relaxed);
                warn!(
                    collection = name,
                    copy = %target.display(),
                    "overwriting corrupt collection, previous contents kept"
                );
            }
            Err(e) => warn!(
                collection = name,
                error = %e,
                "overwriting corrupt collection, could not keep a copy"
            ),
        }
    }

    /// Copy `path` to the first free `<name>.corrupt[-N].json`.
    fn copy_aside(&self, name: &str, path: &Path) -> std::io::Result<PathBuf> {
        let bytes = fs::read(path)?;
        for n in 1u32.. {
            let file_name = if n == 1 {
                format!("{}.{}.{}", name, QUARANTINE_MARKER, COLLECTION_EXT)
            } else {
                format!("{}.{}-{}.{}", name, QUARANTINE_MARKER, n, COLLECTION_EXT)
            };
            let target = self.root.join(file_name);
            match fs::OpenOptions::new().write(true).create_new(true).open(&target) {
                Ok(mut file) => {
                    file.write_all(&bytes)?;
                    return Ok(target);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ErrorKind::AlreadyExists.into())
    }

    /// Atomically replace a collection file: write a temp file next to it,
    /// then rename it over the target. Caller must hold the collection lock.
    fn persist<R: Serialize>(&self, name: &str, path: &Path, records: &[R]) -> Result<()> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(records)?
        } else {
            serde_json::to_vec(records)?
        };

        fs::create_dir_all(&self.root).map_err(|e| StoreError::storage(name, e))?;

        let mut temp = NamedTempFile::new_in(&self.root).map_err(|e| StoreError::storage(name, e))?;
        temp.write_all(&bytes)
            .map_err(|e| StoreError::storage(name, e))?;
        if self.sync_writes {
            temp.as_file()
                .sync_all()
                .map_err(|e| StoreError::storage(name, e))?;
        }
        temp.persist(path)
            .map_err(|e| StoreError::storage(name, e.error))?;

        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        debug!(collection = name, records = records.len(), "collection written");
        Ok(())
    }
}
