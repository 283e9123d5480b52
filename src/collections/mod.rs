//! Collection storage.
//!
//! Each collection is one JSON file holding an array of records. Every
//! operation is a whole-file read or a whole-file atomic replace, and
//! read-modify-write cycles are serialized per collection name.

mod store;

pub use store::{
    validate_collection_name, CollectionRead, CollectionStats, CollectionStore, Commit,
    DegradedRead, ReadStatus,
};
