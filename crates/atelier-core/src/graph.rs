//! Commit graph service: commit creation and history queries.
//!
//! `CommitGraph` is generic over the storage traits so the same logic runs
//! against the in-memory fakes in tests and the SurrealDB backend in
//! deployment.
//!
//! Commit creation is optimistic: the current tip is read as the presumed
//! parent, the new row is inserted, and the tip is swung with a conditional
//! advance. A lost race rolls the row back and retries against the fresh
//! tip with a fresh timestamp (and therefore a fresh commit id), bounded by
//! `MAX_TIP_RETRIES`.
//!
//! History reads are dual-path: a single ranged lookup over cached depths
//! when the cache is complete and trustworthy, otherwise an iterative
//! breadth-first walk over parent pointers.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use tracing::{debug, instrument, warn};

use atelier_state::{
    AdvanceOutcome, BranchRecord, BranchStore, CommitId, CommitRecord, CommitStore, ContentDigest,
};

use crate::domain::{Result, VcsError};
use crate::metrics::METRICS;
use crate::obs;

/// Attempts before a tip race surfaces as `VcsError::Conflict`.
const MAX_TIP_RETRIES: u32 = 3;

/// A commit request, before identity and parentage are resolved.
#[derive(Debug, Clone)]
pub struct NewCommit {
    pub project_id: String,
    pub branch_name: String,
    pub blob_hash: ContentDigest,
    pub author_user_id: String,
    pub message: String,
    pub description: String,
    /// Typed extension metadata. Recognized keys: `client`, `origin`.
    pub metadata: BTreeMap<String, String>,
    /// When set, the commit is parented on this exact commit instead of the
    /// branch tip. Must belong to the same project and branch, or be the
    /// branch's current tip (the cross-project parent every freshly forked
    /// branch has).
    pub parent_commit_id: Option<CommitId>,
}

impl NewCommit {
    pub fn new(
        project_id: impl Into<String>,
        branch_name: impl Into<String>,
        blob_hash: ContentDigest,
        author_user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            branch_name: branch_name.into(),
            blob_hash,
            author_user_id: author_user_id.into(),
            message: message.into(),
            description: String::new(),
            metadata: BTreeMap::new(),
            parent_commit_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parent(mut self, parent: CommitId) -> Self {
        self.parent_commit_id = Some(parent);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Commit graph store over pluggable commit and branch persistence.
pub struct CommitGraph<C, B> {
    commits: C,
    branches: B,
}

impl<C, B> CommitGraph<C, B>
where
    C: CommitStore,
    B: BranchStore,
{
    pub fn new(commits: C, branches: B) -> Self {
        Self { commits, branches }
    }

    /// Access the underlying commit store.
    pub fn commits(&self) -> &C {
        &self.commits
    }

    /// Access the underlying branch directory.
    pub fn branches(&self) -> &B {
        &self.branches
    }

    /// Create a commit on a branch, creating the branch lazily if needed.
    ///
    /// Retries transparently when a concurrent writer moves the tip; after
    /// `MAX_TIP_RETRIES` lost races the `Conflict` surfaces to the caller.
    #[instrument(skip(self, request), fields(project_id = %request.project_id, branch = %request.branch_name))]
    pub async fn create_commit(&self, request: NewCommit) -> Result<CommitRecord> {
        for attempt in 1..=MAX_TIP_RETRIES {
            let branch = self
                .branches
                .ensure(
                    &request.project_id,
                    &request.branch_name,
                    &request.author_user_id,
                )
                .await?;

            let parent = self.resolve_parent(&request, &branch).await?;
            let created_at = Utc::now();
            let commit_id = CommitId::derive(
                &request.author_user_id,
                &request.project_id,
                &request.blob_hash,
                &request.message,
                &request.description,
                parent.as_ref().map(|p| &p.commit_id),
                created_at,
            );
            let depth = match &parent {
                None => Some(0),
                Some(p) => p.depth.map(|d| d + 1),
            };

            let record = CommitRecord {
                commit_id,
                project_id: request.project_id.clone(),
                branch_name: request.branch_name.clone(),
                author_user_id: request.author_user_id.clone(),
                blob_hash: request.blob_hash.clone(),
                message: request.message.clone(),
                description: request.description.clone(),
                metadata: request.metadata.clone(),
                parent_commit_id: parent.as_ref().map(|p| p.commit_id.clone()),
                created_at,
                depth,
            };

            let inserted = self.commits.insert(record).await?;

            let outcome = self
                .branches
                .advance(
                    &request.project_id,
                    &request.branch_name,
                    branch.latest_commit_id.as_ref(),
                    &inserted.commit_id,
                )
                .await?;

            match outcome {
                AdvanceOutcome::Advanced => {
                    METRICS.inc_commits_created();
                    obs::emit_commit_created(
                        &request.project_id,
                        &request.branch_name,
                        &inserted.commit_id,
                        inserted.depth,
                    );
                    return Ok(inserted);
                }
                AdvanceOutcome::Conflict => {
                    // The row never became reachable from any branch; discard
                    // it and retry against the fresh tip.
                    self.commits.remove(&inserted.commit_id).await?;
                    METRICS.inc_tip_conflicts();
                    obs::emit_tip_conflict(&request.project_id, &request.branch_name, attempt);
                    warn!(attempt, "lost branch tip race, retrying");
                }
            }
        }

        Err(VcsError::Conflict {
            project_id: request.project_id,
            branch_name: request.branch_name,
        })
    }

    /// History of the named branches, newest first.
    #[instrument(skip(self, branch_names), fields(branches = branch_names.len()))]
    pub async fn history(
        &self,
        project_id: &str,
        branch_names: &[String],
    ) -> Result<Vec<CommitRecord>> {
        let mut tips = Vec::new();
        for name in branch_names {
            let branch = self.branches.get_branch(project_id, name).await?.ok_or_else(|| {
                VcsError::NotFound(format!("branch {}/{}", project_id, name))
            })?;
            if let Some(tip) = branch.latest_commit_id {
                tips.push(tip);
            }
        }
        if tips.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(commits) = self.ranged_history(project_id, &tips).await? {
            METRICS.inc_history_fast_path();
            obs::emit_history_served(project_id, "ranged", commits.len());
            return Ok(commits);
        }

        let commits = self.walk_history(&tips).await?;
        METRICS.inc_history_fallback();
        obs::emit_history_served(project_id, "walk", commits.len());
        Ok(commits)
    }

    /// Resolve the parent commit for a request against the branch it targets.
    async fn resolve_parent(
        &self,
        request: &NewCommit,
        branch: &BranchRecord,
    ) -> Result<Option<CommitRecord>> {
        match &request.parent_commit_id {
            Some(explicit) => {
                let record = self
                    .commits
                    .get_commit(explicit)
                    .await?
                    .ok_or_else(|| VcsError::InvalidParent(explicit.as_str().to_string()))?;

                let same_line = record.project_id == request.project_id
                    && record.branch_name == request.branch_name;
                // A freshly forked branch points at a commit recorded under
                // the source project; that tip is a legitimate parent.
                let is_current_tip = branch.latest_commit_id.as_ref() == Some(explicit);
                if !same_line && !is_current_tip {
                    return Err(VcsError::InvalidParent(explicit.as_str().to_string()));
                }
                Ok(Some(record))
            }
            None => match &branch.latest_commit_id {
                None => Ok(None),
                Some(tip) => {
                    let record = self.commits.get_commit(tip).await?.ok_or_else(|| {
                        VcsError::NotFound(format!("tip commit {}", tip.short()))
                    })?;
                    Ok(Some(record))
                }
            },
        }
    }

    /// Fast path: one ranged lookup over cached depths.
    ///
    /// Returns `None` when the cache cannot be trusted: a tip without a
    /// depth, a tip missing from the ranged result, or a result set that is
    /// not parent-closed (which is how forked projects, whose ancestry lives
    /// under the source project id, are routed to the walk).
    async fn ranged_history(
        &self,
        project_id: &str,
        tips: &[CommitId],
    ) -> Result<Option<Vec<CommitRecord>>> {
        let tip_records = self.commits.get_many(tips).await?;
        if tip_records.len() != tips.len() {
            return Ok(None);
        }

        let mut max_depth: i64 = 0;
        for record in &tip_records {
            match record.depth {
                Some(d) => max_depth = max_depth.max(d),
                None => return Ok(None),
            }
        }

        let mut commits = self.commits.list_up_to_depth(project_id, max_depth).await?;
        let ids: HashSet<&str> = commits.iter().map(|c| c.commit_id.as_str()).collect();

        let tips_covered = tips.iter().all(|tip| ids.contains(tip.as_str()));
        let parent_closed = commits.iter().all(|c| match &c.parent_commit_id {
            None => true,
            Some(parent) => ids.contains(parent.as_str()),
        });
        if !tips_covered || !parent_closed {
            debug!(tips_covered, parent_closed, "depth cache untrusted");
            return Ok(None);
        }

        sort_newest_first(&mut commits);
        Ok(Some(commits))
    }

    /// Fallback: iterative breadth-first walk from all tips.
    ///
    /// The visited set makes the walk terminate even on corrupted data with
    /// a parent cycle; no recursion, so chain length never threatens the
    /// stack.
    async fn walk_history(&self, tips: &[CommitId]) -> Result<Vec<CommitRecord>> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<CommitId> = tips.to_vec();
        let mut commits: Vec<CommitRecord> = Vec::new();

        while !frontier.is_empty() {
            frontier.retain(|id| visited.insert(id.as_str().to_string()));
            if frontier.is_empty() {
                break;
            }

            let records = self.commits.get_many(&frontier).await?;
            if records.len() != frontier.len() {
                let found: HashSet<&str> =
                    records.iter().map(|c| c.commit_id.as_str()).collect();
                if let Some(missing) = frontier.iter().find(|id| !found.contains(id.as_str())) {
                    return Err(VcsError::NotFound(format!("commit {}", missing.short())));
                }
            }

            let mut next = Vec::new();
            for record in &records {
                if let Some(parent) = &record.parent_commit_id {
                    if !visited.contains(parent.as_str()) {
                        next.push(parent.clone());
                    }
                }
            }
            commits.extend(records);
            frontier = next;
        }

        sort_newest_first(&mut commits);
        Ok(commits)
    }
}

/// Creation time descending; cached depth breaks exact-timestamp ties so
/// both history paths produce the same order.
fn sort_newest_first(commits: &mut [CommitRecord]) {
    commits.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then(b.depth.cmp(&a.depth))
    });
}
