//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryBlobStore`, `MemoryCommitStore`, and `MemoryBranchStore`
//! that satisfy the trait contracts without any external dependencies.
//! `MemoryBranchStore::advance` performs its compare-and-swap under the map
//! lock, so concurrency tests exercise the same race semantics as a real
//! backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryBlobStore
// ---------------------------------------------------------------------------

/// In-memory blob store backed by a `HashMap<digest, BlobRecord>`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, BlobRecord>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows (for deduplication assertions in tests).
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, payload: &str, creator_user_id: &str) -> StorageResult<ContentDigest> {
        let digest = ContentDigest::from_bytes(payload.as_bytes());
        let mut blobs = self.blobs.lock().unwrap();
        // Write-once: a duplicate put is a no-op and keeps the original row.
        blobs
            .entry(digest.as_str().to_string())
            .or_insert_with(|| BlobRecord {
                content_hash: digest.clone(),
                payload: payload.to_string(),
                creator_user_id: creator_user_id.to_string(),
                created_at: Utc::now(),
            });
        Ok(digest)
    }

    async fn get(&self, digest: &ContentDigest) -> StorageResult<String> {
        let blobs = self.blobs.lock().unwrap();
        blobs
            .get(digest.as_str())
            .map(|b| b.payload.clone())
            .ok_or_else(|| StorageError::BlobNotFound {
                digest: digest.as_str().to_string(),
            })
    }

    async fn contains(&self, digest: &ContentDigest) -> StorageResult<bool> {
        let blobs = self.blobs.lock().unwrap();
        Ok(blobs.contains_key(digest.as_str()))
    }
}

// ---------------------------------------------------------------------------
// MemoryCommitStore
// ---------------------------------------------------------------------------

/// In-memory commit store backed by a `HashMap<commit_id, CommitRecord>`.
#[derive(Debug, Default)]
pub struct MemoryCommitStore {
    commits: Mutex<HashMap<String, CommitRecord>>,
}

impl MemoryCommitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total commit rows across all projects (for fork assertions in tests).
    pub fn len(&self) -> usize {
        self.commits.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CommitStore for MemoryCommitStore {
    async fn insert(&self, record: CommitRecord) -> StorageResult<CommitRecord> {
        let mut commits = self.commits.lock().unwrap();
        commits.insert(record.commit_id.as_str().to_string(), record.clone());
        Ok(record)
    }

    async fn remove(&self, commit_id: &CommitId) -> StorageResult<()> {
        let mut commits = self.commits.lock().unwrap();
        commits.remove(commit_id.as_str());
        Ok(())
    }

    async fn get_commit(&self, commit_id: &CommitId) -> StorageResult<Option<CommitRecord>> {
        let commits = self.commits.lock().unwrap();
        Ok(commits.get(commit_id.as_str()).cloned())
    }

    async fn get_many(&self, commit_ids: &[CommitId]) -> StorageResult<Vec<CommitRecord>> {
        let commits = self.commits.lock().unwrap();
        Ok(commit_ids
            .iter()
            .filter_map(|id| commits.get(id.as_str()).cloned())
            .collect())
    }

    async fn list_up_to_depth(
        &self,
        project_id: &str,
        max_depth: i64,
    ) -> StorageResult<Vec<CommitRecord>> {
        let commits = self.commits.lock().unwrap();
        let mut rows: Vec<CommitRecord> = commits
            .values()
            .filter(|c| {
                c.project_id == project_id && c.depth.map(|d| d <= max_depth).unwrap_or(false)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_missing_depth(&self, project_id: &str) -> StorageResult<Vec<CommitId>> {
        let commits = self.commits.lock().unwrap();
        Ok(commits
            .values()
            .filter(|c| c.project_id == project_id && c.depth.is_none())
            .map(|c| c.commit_id.clone())
            .collect())
    }

    async fn fill_depth(&self, commit_id: &CommitId, depth: i64) -> StorageResult<bool> {
        let mut commits = self.commits.lock().unwrap();
        let record = commits
            .get_mut(commit_id.as_str())
            .ok_or_else(|| StorageError::CommitNotFound {
                commit_id: commit_id.as_str().to_string(),
            })?;
        if record.depth.is_some() {
            return Ok(false);
        }
        record.depth = Some(depth);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// MemoryBranchStore
// ---------------------------------------------------------------------------

/// In-memory branch directory keyed by `(project_id, name)`.
#[derive(Debug, Default)]
pub struct MemoryBranchStore {
    branches: Mutex<HashMap<(String, String), BranchRecord>>,
}

impl MemoryBranchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BranchStore for MemoryBranchStore {
    async fn ensure(
        &self,
        project_id: &str,
        name: &str,
        creator_user_id: &str,
    ) -> StorageResult<BranchRecord> {
        let mut branches = self.branches.lock().unwrap();
        let record = branches
            .entry((project_id.to_string(), name.to_string()))
            .or_insert_with(|| BranchRecord::new(project_id, name, creator_user_id));
        Ok(record.clone())
    }

    async fn get_branch(&self, project_id: &str, name: &str) -> StorageResult<Option<BranchRecord>> {
        let branches = self.branches.lock().unwrap();
        Ok(branches
            .get(&(project_id.to_string(), name.to_string()))
            .cloned())
    }

    async fn list(&self, project_id: &str) -> StorageResult<Vec<BranchRecord>> {
        let branches = self.branches.lock().unwrap();
        let mut rows: Vec<BranchRecord> = branches
            .values()
            .filter(|b| b.project_id == project_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn create(&self, record: BranchRecord) -> StorageResult<BranchRecord> {
        let mut branches = self.branches.lock().unwrap();
        let key = (record.project_id.clone(), record.name.clone());
        if branches.contains_key(&key) {
            return Err(StorageError::DuplicateBranch {
                project_id: record.project_id,
                name: record.name,
            });
        }
        branches.insert(key, record.clone());
        Ok(record)
    }

    async fn advance(
        &self,
        project_id: &str,
        name: &str,
        expected_tip: Option<&CommitId>,
        new_tip: &CommitId,
    ) -> StorageResult<AdvanceOutcome> {
        let mut branches = self.branches.lock().unwrap();
        let record = branches
            .get_mut(&(project_id.to_string(), name.to_string()))
            .ok_or_else(|| StorageError::BranchNotFound {
                project_id: project_id.to_string(),
                name: name.to_string(),
            })?;
        if record.latest_commit_id.as_ref() != expected_tip {
            return Ok(AdvanceOutcome::Conflict);
        }
        record.latest_commit_id = Some(new_tip.clone());
        record.updated_at = Utc::now();
        Ok(AdvanceOutcome::Advanced)
    }
}
