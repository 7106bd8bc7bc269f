//! Atelier-State: SurrealDB Backend for Atelier Version Control
//!
//! This crate provides the persistence layer for the Atelier project
//! version-control subsystem. It handles all I/O with SurrealDB, providing a
//! clean persistence layer for blobs, commit graph nodes, and branch
//! pointers.
//!
//! ## Key Components
//!
//! - `storage_traits`: `BlobStore`, `CommitStore`, `BranchStore` abstractions
//! - `SurrealRevisionStore`: SurrealDB implementation of all three traits
//! - `fakes`: In-memory implementations for testing
//! - `ContentDigest` / `CommitId`: content-derived identifiers

mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use schema::{DbBlob, DbBranch, DbCommit};
pub use storage_traits::{
    AdvanceOutcome, BlobRecord, BlobStore, BranchRecord, BranchStore, CommitId, CommitRecord,
    CommitStore, ContentDigest, StorageResult,
};
pub use surreal_store::{CloudConfig, SurrealRevisionStore};

/// Result type for atelier-state operations
pub type Result<T> = std::result::Result<T, StateError>;
