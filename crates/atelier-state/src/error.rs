//! Error types for atelier-state

use thiserror::Error;

/// Errors that can occur while managing the SurrealDB connection itself
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors surfaced through the storage traits.
///
/// Every backend (in-memory fake or SurrealDB) maps its failures into this
/// taxonomy so callers never have to match on backend-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No blob stored under the given content hash
    #[error("blob not found: {digest}")]
    BlobNotFound { digest: String },

    /// No commit row with the given id
    #[error("commit not found: {commit_id}")]
    CommitNotFound { commit_id: String },

    /// No branch row for the given project/name pair
    #[error("branch not found: {project_id}/{name}")]
    BranchNotFound { project_id: String, name: String },

    /// A branch with this name already exists in the project
    #[error("branch already exists: {project_id}/{name}")]
    DuplicateBranch { project_id: String, name: String },

    /// A string failed content-digest validation
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Underlying storage failure (connection, query, serialization)
    #[error("storage backend error: {0}")]
    Backend(String),
}
