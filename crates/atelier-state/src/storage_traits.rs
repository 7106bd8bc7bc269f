//! Storage trait definitions for Atelier version control
//!
//! These traits define the core storage abstractions:
//! - `BlobStore`: Content-addressed project source storage (put/get by digest)
//! - `CommitStore`: Append-only commit graph node persistence
//! - `BranchStore`: Named branch pointers with a conditional advance primitive
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest — content address of a stored blob
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CommitId — content-derived identity of a commit node
// ---------------------------------------------------------------------------

/// Unique identifier for a commit (SHA-256 hex string).
///
/// Derived over the commit's logical fields plus its creation timestamp, so
/// content-identical resubmissions still get distinct identities. Unlike
/// blobs, commit nodes trade deduplication for uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(pub String);

impl CommitId {
    /// Derive a commit id from its logical fields and creation timestamp.
    ///
    /// Uses single-byte markers and NUL separators between fields so that
    /// no two distinct field tuples can produce the same byte stream.
    pub fn derive(
        author_user_id: &str,
        project_id: &str,
        blob_hash: &ContentDigest,
        message: &str,
        description: &str,
        parent_commit_id: Option<&CommitId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut hasher = Sha256::new();

        hasher.update(b"A:");
        hasher.update(author_user_id.as_bytes());
        hasher.update(b"\0");

        hasher.update(b"J:");
        hasher.update(project_id.as_bytes());
        hasher.update(b"\0");

        hasher.update(b"B:");
        hasher.update(blob_hash.as_str().as_bytes());
        hasher.update(b"\0");

        hasher.update(b"M:");
        hasher.update(message.as_bytes());
        hasher.update(b"\0");

        hasher.update(b"D:");
        hasher.update(description.as_bytes());
        hasher.update(b"\0");

        hasher.update(b"P");
        match parent_commit_id {
            Some(parent) => {
                hasher.update(b"S");
                hasher.update(parent.0.as_bytes());
            }
            None => hasher.update(b"N"),
        }
        hasher.update(b"\0");

        hasher.update(b"T:");
        hasher.update(created_at.timestamp_micros().to_be_bytes());

        CommitId(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 8 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Stored blob: immutable payload plus authorship metadata.
///
/// The content hash is the primary key; a given hash maps to exactly one
/// payload for the lifetime of the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobRecord {
    pub content_hash: ContentDigest,
    pub payload: String,
    pub creator_user_id: String,
    pub created_at: DateTime<Utc>,
}

/// A single immutable revision node in a project's commit graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub commit_id: CommitId,
    pub project_id: String,
    /// Branch this commit was made against, recorded on the node itself.
    pub branch_name: String,
    pub author_user_id: String,
    pub blob_hash: ContentDigest,
    pub message: String,
    pub description: String,
    /// Typed extension metadata. Recognized keys: `client`, `origin`.
    pub metadata: BTreeMap<String, String>,
    /// `None` marks a root commit.
    pub parent_commit_id: Option<CommitId>,
    pub created_at: DateTime<Utc>,
    /// Cached ancestor count; `None` until backfilled.
    pub depth: Option<i64>,
}

/// A mutable named pointer into a project's commit graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRecord {
    pub project_id: String,
    /// Unique within the project.
    pub name: String,
    pub creator_user_id: String,
    pub description: String,
    /// `None` until the first commit lands on this branch.
    pub latest_commit_id: Option<CommitId>,
    pub protected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BranchRecord {
    /// Create a new branch record with no tip.
    pub fn new(project_id: &str, name: &str, creator_user_id: &str) -> Self {
        let now = Utc::now();
        BranchRecord {
            project_id: project_id.to_string(),
            name: name.to_string(),
            creator_user_id: creator_user_id.to_string(),
            description: String::new(),
            latest_commit_id: None,
            protected: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of a conditional branch-tip update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The tip matched the expected value and was swung to the new commit.
    Advanced,
    /// Another writer moved the tip since it was read; nothing was written.
    Conflict,
}

// ---------------------------------------------------------------------------
// BlobStore — content-addressed project source storage
// ---------------------------------------------------------------------------

/// Content-addressed blob store.
///
/// Guarantees:
/// - `put(payload, _)` always returns the SHA-256 digest of `payload`.
/// - Writes are idempotent: duplicate payloads create at most one row.
/// - Blobs are never deleted; they are shared across projects and commits.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a payload and return its content digest. Idempotent.
    async fn put(&self, payload: &str, creator_user_id: &str) -> StorageResult<ContentDigest>;

    /// Retrieve a payload by digest. Returns `StorageError::BlobNotFound` if absent.
    async fn get(&self, digest: &ContentDigest) -> StorageResult<String>;

    /// Check whether a digest exists without transferring the payload.
    async fn contains(&self, digest: &ContentDigest) -> StorageResult<bool>;
}

// ---------------------------------------------------------------------------
// CommitStore — append-only commit graph persistence
// ---------------------------------------------------------------------------

/// Commit graph node persistence.
///
/// Guarantees:
/// - Rows are append-only: no update path except `fill_depth`, which only
///   ever writes into a `None` depth.
/// - Lookups by id are global (not project-scoped) so that forked projects
///   can reach ancestry recorded under their source project.
#[async_trait]
pub trait CommitStore: Send + Sync {
    /// Persist a new commit row.
    async fn insert(&self, record: CommitRecord) -> StorageResult<CommitRecord>;

    /// Remove a commit row that was never reachable from any branch.
    ///
    /// This exists solely so `create_commit` can roll back an insert whose
    /// branch advance lost the tip race. Reachable commits are never removed.
    async fn remove(&self, commit_id: &CommitId) -> StorageResult<()>;

    /// Fetch a single commit by id.
    async fn get_commit(&self, commit_id: &CommitId) -> StorageResult<Option<CommitRecord>>;

    /// Bulk-fetch commits by id. Missing ids are silently absent from the result.
    async fn get_many(&self, commit_ids: &[CommitId]) -> StorageResult<Vec<CommitRecord>>;

    /// All commits of a project whose cached depth is in `[0, max_depth]`,
    /// newest first.
    async fn list_up_to_depth(
        &self,
        project_id: &str,
        max_depth: i64,
    ) -> StorageResult<Vec<CommitRecord>>;

    /// Ids of all commits of a project whose depth has not been computed yet.
    async fn list_missing_depth(&self, project_id: &str) -> StorageResult<Vec<CommitId>>;

    /// Write `depth` into a commit row only if its depth is currently unset.
    ///
    /// Returns `true` if the row was updated, `false` if the depth was
    /// already populated (by a concurrent writer or an earlier run).
    async fn fill_depth(&self, commit_id: &CommitId, depth: i64) -> StorageResult<bool>;
}

// ---------------------------------------------------------------------------
// BranchStore — named pointers with conditional advance
// ---------------------------------------------------------------------------

/// Branch directory: per-project named pointers into the commit graph.
///
/// Semantics:
/// - `ensure` is idempotent under concurrency: two callers creating the same
///   branch name must both succeed and observe a single row.
/// - `advance` is a compare-and-swap on `latest_commit_id`; it is the only
///   way a tip moves. No lost updates, no duplicate tips.
#[async_trait]
pub trait BranchStore: Send + Sync {
    /// Return the existing branch or create one with a null tip.
    async fn ensure(
        &self,
        project_id: &str,
        name: &str,
        creator_user_id: &str,
    ) -> StorageResult<BranchRecord>;

    /// Fetch a branch by project and name.
    async fn get_branch(&self, project_id: &str, name: &str) -> StorageResult<Option<BranchRecord>>;

    /// All branches of a project, ordered by name.
    async fn list(&self, project_id: &str) -> StorageResult<Vec<BranchRecord>>;

    /// Create a branch from a fully-formed record.
    ///
    /// Errors with `StorageError::DuplicateBranch` if the project already has
    /// a branch of that name. Used by the fork engine, which seeds tips from
    /// another project's branches.
    async fn create(&self, record: BranchRecord) -> StorageResult<BranchRecord>;

    /// Conditionally swing the tip from `expected_tip` to `new_tip`.
    ///
    /// Returns `Conflict` when the stored tip no longer matches
    /// `expected_tip`; the caller must re-resolve and retry.
    async fn advance(
        &self,
        project_id: &str,
        name: &str,
        expected_tip: Option<&CommitId>,
        new_tip: &CommitId,
    ) -> StorageResult<AdvanceOutcome>;
}

// Shared-ownership delegation so services can hold `Arc<impl Trait>` and
// spawned tasks can clone handles to one store.

#[async_trait]
impl<T> BlobStore for std::sync::Arc<T>
where
    T: BlobStore + ?Sized,
{
    async fn put(&self, payload: &str, creator_user_id: &str) -> StorageResult<ContentDigest> {
        (**self).put(payload, creator_user_id).await
    }

    async fn get(&self, digest: &ContentDigest) -> StorageResult<String> {
        (**self).get(digest).await
    }

    async fn contains(&self, digest: &ContentDigest) -> StorageResult<bool> {
        (**self).contains(digest).await
    }
}

#[async_trait]
impl<T> CommitStore for std::sync::Arc<T>
where
    T: CommitStore + ?Sized,
{
    async fn insert(&self, record: CommitRecord) -> StorageResult<CommitRecord> {
        (**self).insert(record).await
    }

    async fn remove(&self, commit_id: &CommitId) -> StorageResult<()> {
        (**self).remove(commit_id).await
    }

    async fn get_commit(&self, commit_id: &CommitId) -> StorageResult<Option<CommitRecord>> {
        (**self).get_commit(commit_id).await
    }

    async fn get_many(&self, commit_ids: &[CommitId]) -> StorageResult<Vec<CommitRecord>> {
        (**self).get_many(commit_ids).await
    }

    async fn list_up_to_depth(
        &self,
        project_id: &str,
        max_depth: i64,
    ) -> StorageResult<Vec<CommitRecord>> {
        (**self).list_up_to_depth(project_id, max_depth).await
    }

    async fn list_missing_depth(&self, project_id: &str) -> StorageResult<Vec<CommitId>> {
        (**self).list_missing_depth(project_id).await
    }

    async fn fill_depth(&self, commit_id: &CommitId, depth: i64) -> StorageResult<bool> {
        (**self).fill_depth(commit_id, depth).await
    }
}

#[async_trait]
impl<T> BranchStore for std::sync::Arc<T>
where
    T: BranchStore + ?Sized,
{
    async fn ensure(
        &self,
        project_id: &str,
        name: &str,
        creator_user_id: &str,
    ) -> StorageResult<BranchRecord> {
        (**self).ensure(project_id, name, creator_user_id).await
    }

    async fn get_branch(&self, project_id: &str, name: &str) -> StorageResult<Option<BranchRecord>> {
        (**self).get_branch(project_id, name).await
    }

    async fn list(&self, project_id: &str) -> StorageResult<Vec<BranchRecord>> {
        (**self).list(project_id).await
    }

    async fn create(&self, record: BranchRecord) -> StorageResult<BranchRecord> {
        (**self).create(record).await
    }

    async fn advance(
        &self,
        project_id: &str,
        name: &str,
        expected_tip: Option<&CommitId>,
        new_tip: &CommitId,
    ) -> StorageResult<AdvanceOutcome> {
        (**self)
            .advance(project_id, name, expected_tip, new_tip)
            .await
    }
}
