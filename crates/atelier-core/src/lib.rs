//! Atelier Version Control Core Library
//!
//! The domain layer of the Atelier project version-control subsystem:
//! commit graph operations, depth backfill, read capabilities, and forking,
//! all generic over the storage traits in `atelier-state`.
//!
//! Callers are expected to have consulted the platform permission oracle
//! before invoking anything here; this crate enforces graph and token
//! invariants, not project ACLs.

pub mod backfill;
pub mod capability;
pub mod domain;
pub mod fork;
pub mod graph;
pub mod metrics;
pub mod obs;
pub mod telemetry;

pub use backfill::DepthBackfill;
pub use capability::{CapabilityIssuer, ANY_SUBJECT};
pub use domain::{Result, VcsError};
pub use fork::{ForkEngine, ForkSelection};
pub use graph::{CommitGraph, NewCommit};

pub use atelier_state::{
    AdvanceOutcome, BlobRecord, BlobStore, BranchRecord, BranchStore, CommitId, CommitRecord,
    CommitStore, ContentDigest, StorageError, SurrealRevisionStore,
};

pub use metrics::METRICS;
pub use obs::{
    emit_backfill_finished, emit_capability_rejected, emit_commit_created, emit_history_served,
    emit_project_forked, emit_tip_conflict, ProjectSpan,
};
pub use telemetry::init_tracing;

/// Atelier version-control core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
