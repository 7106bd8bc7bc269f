//! Domain-level error taxonomy for Atelier version control.

use atelier_state::StorageError;

/// Version-control domain errors.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// A blob, commit, or branch the request referenced does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An explicit parent was missing or belongs to a different line of history.
    #[error("invalid parent commit: {0}")]
    InvalidParent(String),

    /// The branch tip moved concurrently and the bounded retries ran out.
    /// Recoverable: the end caller may resubmit the commit.
    #[error("branch tip moved concurrently: {project_id}/{branch_name}")]
    Conflict {
        project_id: String,
        branch_name: String,
    },

    /// The branch is marked protected. Never raised by this crate; carried in
    /// the taxonomy for the calling layer, which owns protection enforcement.
    #[error("branch is protected: {project_id}/{branch_name}")]
    BranchProtected {
        project_id: String,
        branch_name: String,
    },

    /// A fork target already has a branch of this name.
    #[error("branch already exists: {project_id}/{name}")]
    DuplicateBranchName { project_id: String, name: String },

    /// A read capability failed verification. Deliberately opaque: callers
    /// must not learn whether the signature, expiry, action, or subject
    /// check failed.
    #[error("capability rejected")]
    InvalidCapability,

    /// Underlying persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for VcsError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BlobNotFound { digest } => VcsError::NotFound(format!("blob {digest}")),
            StorageError::CommitNotFound { commit_id } => {
                VcsError::NotFound(format!("commit {commit_id}"))
            }
            StorageError::BranchNotFound { project_id, name } => {
                VcsError::NotFound(format!("branch {project_id}/{name}"))
            }
            StorageError::DuplicateBranch { project_id, name } => {
                VcsError::DuplicateBranchName { project_id, name }
            }
            other => VcsError::Storage(other.to_string()),
        }
    }
}

/// Result type for version-control domain operations.
pub type Result<T> = std::result::Result<T, VcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_not_found_lowers_to_domain_not_found() {
        let err: VcsError = StorageError::CommitNotFound {
            commit_id: "abc123".to_string(),
        }
        .into();
        assert!(matches!(err, VcsError::NotFound(msg) if msg.contains("abc123")));
    }

    #[test]
    fn test_duplicate_branch_keeps_its_identity() {
        let err: VcsError = StorageError::DuplicateBranch {
            project_id: "p1".to_string(),
            name: "main".to_string(),
        }
        .into();
        assert!(matches!(err, VcsError::DuplicateBranchName { .. }));
    }

    #[test]
    fn test_backend_failures_become_storage_errors() {
        let err: VcsError = StorageError::Backend("connection reset".to_string()).into();
        assert!(matches!(err, VcsError::Storage(msg) if msg.contains("connection reset")));
    }

    #[test]
    fn test_capability_error_is_opaque() {
        assert_eq!(VcsError::InvalidCapability.to_string(), "capability rejected");
    }
}
