//! Depth backfill job for commits persisted before their parent's depth was
//! known.
//!
//! `create_commit` propagates `depth = parent.depth + 1` when it can; any
//! commit created on top of an unfilled parent is left at `None` and picked
//! up here. Resolution is memoised across a batch and persisted with a
//! fill-only-if-null write, so the job is idempotent and safe to run
//! concurrently with live commit creation.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use atelier_state::{CommitId, CommitStore};

use crate::domain::{Result, VcsError};
use crate::obs;

/// Batch recomputation of cached commit depths.
pub struct DepthBackfill<C> {
    commits: C,
}

impl<C> DepthBackfill<C>
where
    C: CommitStore,
{
    pub fn new(commits: C) -> Self {
        Self { commits }
    }

    /// Backfill every unfilled commit of a project, sharing one memo across
    /// the batch. Returns the number of commits processed.
    #[instrument(skip(self))]
    pub async fn run(&self, project_id: &str) -> Result<usize> {
        let pending = self.commits.list_missing_depth(project_id).await?;
        let total = pending.len();

        let mut memo: HashMap<String, i64> = HashMap::new();
        for commit_id in &pending {
            self.resolve(commit_id, &mut memo).await?;
        }

        obs::emit_backfill_finished(project_id, total);
        Ok(total)
    }

    /// Resolve and persist the depth of one commit.
    ///
    /// Walks the parent chain iteratively (no recursion; chain length never
    /// threatens the stack) until it reaches a memoised depth, a persisted
    /// depth, or a root, then unwinds assigning `parent + 1` at each step.
    pub async fn resolve(
        &self,
        commit_id: &CommitId,
        memo: &mut HashMap<String, i64>,
    ) -> Result<i64> {
        if let Some(depth) = memo.get(commit_id.as_str()) {
            return Ok(*depth);
        }

        // Unresolved suffix of the chain, deepest-first.
        let mut chain: Vec<CommitId> = Vec::new();
        let mut on_chain: HashSet<String> = HashSet::new();
        let mut cursor = commit_id.clone();

        // A root unwinds from -1 so the root itself lands at 0.
        let base_depth: i64 = loop {
            if let Some(depth) = memo.get(cursor.as_str()) {
                break *depth;
            }
            let record = self
                .commits
                .get_commit(&cursor)
                .await?
                .ok_or_else(|| VcsError::NotFound(format!("commit {}", cursor.short())))?;
            if let Some(depth) = record.depth {
                memo.insert(cursor.as_str().to_string(), depth);
                break depth;
            }
            if !on_chain.insert(cursor.as_str().to_string()) {
                return Err(VcsError::Storage(format!(
                    "parent cycle at commit {}",
                    cursor.short()
                )));
            }
            chain.push(cursor.clone());
            match record.parent_commit_id {
                None => break -1,
                Some(parent) => cursor = parent,
            }
        };

        let mut depth = base_depth;
        for id in chain.iter().rev() {
            depth += 1;
            // Fill-if-null: a value written concurrently by a live commit is
            // never overwritten (both writers derive the same number anyway).
            let filled = self.commits.fill_depth(id, depth).await?;
            if !filled {
                debug!(commit_id = %id.short(), "depth already populated");
            }
            memo.insert(id.as_str().to_string(), depth);
        }

        Ok(memo.get(commit_id.as_str()).copied().unwrap_or(base_depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use atelier_state::fakes::MemoryCommitStore;
    use atelier_state::{CommitRecord, ContentDigest};
    use chrono::Utc;

    fn chain_commit(
        project_id: &str,
        seed: &str,
        parent: Option<&CommitId>,
        depth: Option<i64>,
    ) -> CommitRecord {
        let blob_hash = ContentDigest::from_bytes(seed.as_bytes());
        let created_at = Utc::now();
        let commit_id =
            CommitId::derive("tester", project_id, &blob_hash, seed, "", parent, created_at);
        CommitRecord {
            commit_id,
            project_id: project_id.to_string(),
            branch_name: "main".to_string(),
            author_user_id: "tester".to_string(),
            blob_hash,
            message: seed.to_string(),
            description: String::new(),
            metadata: BTreeMap::new(),
            parent_commit_id: parent.cloned(),
            created_at,
            depth,
        }
    }

    #[tokio::test]
    async fn resolves_full_unfilled_chain() {
        let store = MemoryCommitStore::new();
        let root = chain_commit("p1", "root", None, None);
        let mid = chain_commit("p1", "mid", Some(&root.commit_id), None);
        let tip = chain_commit("p1", "tip", Some(&mid.commit_id), None);
        let tip_id = tip.commit_id.clone();

        store.insert(root.clone()).await.unwrap();
        store.insert(mid.clone()).await.unwrap();
        store.insert(tip).await.unwrap();

        let backfill = DepthBackfill::new(store);
        let mut memo = HashMap::new();
        let depth = backfill.resolve(&tip_id, &mut memo).await.unwrap();

        assert_eq!(depth, 2);
        assert_eq!(
            backfill.commits.get_commit(&root.commit_id).await.unwrap().unwrap().depth,
            Some(0)
        );
        assert_eq!(
            backfill.commits.get_commit(&mid.commit_id).await.unwrap().unwrap().depth,
            Some(1)
        );
    }

    #[tokio::test]
    async fn stops_at_first_known_depth() {
        let store = MemoryCommitStore::new();
        let root = chain_commit("p1", "root", None, Some(0));
        let tip = chain_commit("p1", "tip", Some(&root.commit_id), None);
        let tip_id = tip.commit_id.clone();

        store.insert(root).await.unwrap();
        store.insert(tip).await.unwrap();

        let backfill = DepthBackfill::new(store);
        let mut memo = HashMap::new();
        assert_eq!(backfill.resolve(&tip_id, &mut memo).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn memo_is_shared_across_sibling_calls() {
        let store = MemoryCommitStore::new();
        let root = chain_commit("p1", "root", None, None);
        let a = chain_commit("p1", "a", Some(&root.commit_id), None);
        let b = chain_commit("p1", "b", Some(&root.commit_id), None);
        let a_id = a.commit_id.clone();
        let b_id = b.commit_id.clone();

        store.insert(root).await.unwrap();
        store.insert(a).await.unwrap();
        store.insert(b).await.unwrap();

        let backfill = DepthBackfill::new(store);
        let mut memo = HashMap::new();
        assert_eq!(backfill.resolve(&a_id, &mut memo).await.unwrap(), 1);
        // The shared root is already memoised for the sibling.
        assert!(memo.len() >= 2);
        assert_eq!(backfill.resolve(&b_id, &mut memo).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn run_is_idempotent() {
        let store = MemoryCommitStore::new();
        let root = chain_commit("p1", "root", None, None);
        let tip = chain_commit("p1", "tip", Some(&root.commit_id), None);
        store.insert(root).await.unwrap();
        store.insert(tip).await.unwrap();

        let backfill = DepthBackfill::new(store);
        assert_eq!(backfill.run("p1").await.unwrap(), 2);
        // Everything is filled; a second sweep finds nothing.
        assert_eq!(backfill.run("p1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn detects_parent_cycle_instead_of_hanging() {
        let store = MemoryCommitStore::new();
        // Hand-build two commits that point at each other (corrupted data).
        let mut a = chain_commit("p1", "a", None, None);
        let mut b = chain_commit("p1", "b", None, None);
        a.parent_commit_id = Some(b.commit_id.clone());
        b.parent_commit_id = Some(a.commit_id.clone());
        let a_id = a.commit_id.clone();

        store.insert(a).await.unwrap();
        store.insert(b).await.unwrap();

        let backfill = DepthBackfill::new(store);
        let mut memo = HashMap::new();
        let err = backfill.resolve(&a_id, &mut memo).await.unwrap_err();
        assert!(matches!(err, VcsError::Storage(msg) if msg.contains("cycle")));
    }
}
