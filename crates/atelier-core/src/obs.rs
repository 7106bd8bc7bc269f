//! Structured observability hooks for version-control lifecycle events.
//!
//! This module provides:
//! - Project-scoped tracing spans via `ProjectSpan` RAII guard
//! - Emission functions for key lifecycle events: commit creation, tip
//!   races, history reads, backfill sweeps, capability rejections
//!
//! Events are emitted at `info!` level (filterable via `RUST_LOG`).

use atelier_state::CommitId;
use tracing::info;

/// RAII guard that enters a project-scoped tracing span.
pub struct ProjectSpan {
    _span: tracing::span::EnteredSpan,
}

impl ProjectSpan {
    /// Create and enter a span tagged with the project id.
    pub fn enter(project_id: &str) -> Self {
        let span = tracing::info_span!("atelier.project", project_id = %project_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a commit was created and its branch tip advanced.
pub fn emit_commit_created(
    project_id: &str,
    branch_name: &str,
    commit_id: &CommitId,
    depth: Option<i64>,
) {
    info!(
        event = "commit.created",
        project_id = %project_id,
        branch = %branch_name,
        commit_id = %commit_id.short(),
        depth = depth,
    );
}

/// Emit event: a branch tip advance lost to a concurrent writer.
pub fn emit_tip_conflict(project_id: &str, branch_name: &str, attempt: u32) {
    info!(
        event = "commit.tip_conflict",
        project_id = %project_id,
        branch = %branch_name,
        attempt = attempt,
    );
}

/// Emit event: a history read was served, with the path taken.
pub fn emit_history_served(project_id: &str, path: &str, commits: usize) {
    info!(
        event = "history.served",
        project_id = %project_id,
        path = %path,
        commits = commits,
    );
}

/// Emit event: a depth backfill sweep finished.
pub fn emit_backfill_finished(project_id: &str, filled: usize) {
    info!(event = "backfill.finished", project_id = %project_id, filled = filled);
}

/// Emit event: a project was forked.
pub fn emit_project_forked(source_project_id: &str, target_project_id: &str, branches: usize) {
    info!(
        event = "project.forked",
        source = %source_project_id,
        target = %target_project_id,
        branches = branches,
    );
}

/// Emit event: a capability token failed verification.
///
/// No cause is recorded; the rejection is as opaque in the logs as it is to
/// the caller.
pub fn emit_capability_rejected() {
    info!(event = "capability.rejected");
}
