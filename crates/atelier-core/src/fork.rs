//! Fork engine: seed a new project from an existing one's branch pointers.
//!
//! A fork copies pointers only. Each selected source branch yields a branch
//! row under the target project with the same name and tip; no blob or
//! commit rows are written. Shared history stays shared — the target
//! project's first commit on a forked branch parents on a commit recorded
//! under the source project, which the commit graph's parent resolution
//! admits for exactly this case.

use chrono::Utc;
use futures::future::try_join_all;
use tracing::instrument;

use atelier_state::{BranchRecord, BranchStore};

use crate::domain::{Result, VcsError};
use crate::metrics::METRICS;
use crate::obs;

/// Which source branches a fork copies.
#[derive(Debug, Clone)]
pub enum ForkSelection {
    /// Copy only the source project's default branch. The name comes from
    /// the project record, which lives outside this subsystem.
    DefaultBranch { name: String },
    /// Copy every branch of the source project.
    AllBranches,
}

/// Clones branch pointers from one project to another.
pub struct ForkEngine<B> {
    branches: B,
}

impl<B> ForkEngine<B>
where
    B: BranchStore,
{
    pub fn new(branches: B) -> Self {
        Self { branches }
    }

    /// Fork `source_project_id` into `target_project_id`.
    ///
    /// Returns the branch rows created under the target. Errors with
    /// `DuplicateBranchName` if the target already has one of the names —
    /// unexpected for a freshly created project, but checked regardless.
    #[instrument(skip(self, selection))]
    pub async fn fork(
        &self,
        source_project_id: &str,
        target_project_id: &str,
        creator_user_id: &str,
        selection: ForkSelection,
    ) -> Result<Vec<BranchRecord>> {
        let sources = match selection {
            ForkSelection::DefaultBranch { name } => {
                let branch = self
                    .branches
                    .get_branch(source_project_id, &name)
                    .await?
                    .ok_or_else(|| {
                        VcsError::NotFound(format!("branch {}/{}", source_project_id, name))
                    })?;
                vec![branch]
            }
            ForkSelection::AllBranches => self.branches.list(source_project_id).await?,
        };

        let now = Utc::now();
        let created = try_join_all(sources.into_iter().map(|source| {
            let record = BranchRecord {
                project_id: target_project_id.to_string(),
                name: source.name,
                creator_user_id: creator_user_id.to_string(),
                description: source.description,
                // The pointer copy: future commits diverge from here.
                latest_commit_id: source.latest_commit_id,
                protected: false,
                created_at: now,
                updated_at: now,
            };
            self.branches.create(record)
        }))
        .await?;

        METRICS.inc_forks_created();
        obs::emit_project_forked(source_project_id, target_project_id, created.len());
        Ok(created)
    }
}
