//! SurrealDB schema migrations and initialization
//!
//! This module provides initialization functions to set up all tables
//! with proper constraints and indexes.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Atelier version-control tables in SurrealDB
///
/// This should be called once on first connection to set up the schema.
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Atelier SurrealDB schema");

    init_blobs_table(db).await?;
    init_commits_table(db).await?;
    init_branches_table(db).await?;

    info!("Atelier schema initialization complete");
    Ok(())
}

/// Initialize `blobs` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE blobs {
///   content_hash:     STRING (primary key, unique)
///   payload:          STRING (project source text)
///   creator_user_id:  STRING
///   created_at:       DATETIME
/// }
/// ```
///
/// Constraints:
/// - `content_hash` is unique: the race window in an idempotent put is
///   closed by the index, concurrent writers of the same payload converge
///   on a single row.
/// - Rows are never updated or deleted (blobs are kept forever).
async fn init_blobs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing blobs table");

    let sql = r#"
        DEFINE TABLE blobs
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        -- One row per distinct payload
        DEFINE INDEX idx_content_hash ON TABLE blobs COLUMNS content_hash UNIQUE;

        -- Index creator for audit queries
        DEFINE INDEX idx_blob_creator ON TABLE blobs COLUMNS creator_user_id;
    "#;

    db.query(sql)
        .await
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?;
    info!("✓ blobs table initialized");
    Ok(())
}

/// Initialize `commits` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE commits {
///   commit_id:         STRING (primary key, unique)
///   project_id:        STRING
///   branch_name:       STRING
///   author_user_id:    STRING
///   blob_hash:         STRING (foreign key to blobs.content_hash)
///   message:           STRING
///   description:       STRING
///   metadata:          OBJECT (typed string map)
///   parent_commit_id:  STRING? (absent for root commits)
///   created_at:        DATETIME
///   depth:             INT? (absent until backfilled)
/// }
/// ```
///
/// Constraints:
/// - `commit_id` is unique (content-derived hash).
/// - Rows are append-only; `depth` is the only field ever updated, and only
///   from absent to a value (enforced via the fill-if-null query).
async fn init_commits_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing commits table");

    let sql = r#"
        DEFINE TABLE commits
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX idx_commit_id ON TABLE commits COLUMNS commit_id UNIQUE;

        -- Index project for history scans
        DEFINE INDEX idx_commit_project ON TABLE commits COLUMNS project_id;

        -- Composite (project_id, depth) is the fast-path ranged lookup
        DEFINE INDEX idx_commit_project_depth ON TABLE commits COLUMNS project_id, depth;

        -- Index parent for child lookups
        DEFINE INDEX idx_commit_parent ON TABLE commits COLUMNS parent_commit_id;

        -- Index (project_id, created_at) for newest-first ordering
        DEFINE INDEX idx_commit_project_created ON TABLE commits COLUMNS project_id, created_at;
    "#;

    db.query(sql)
        .await
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?;
    info!("✓ commits table initialized");
    Ok(())
}

/// Initialize `branches` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE branches {
///   project_id:        STRING (part of uniqueness constraint)
///   name:              STRING (unique within project)
///   creator_user_id:   STRING
///   description:       STRING
///   latest_commit_id:  STRING? (absent until first commit)
///   protected:         BOOL
///   created_at:        DATETIME
///   updated_at:        DATETIME
/// }
/// ```
///
/// Constraints:
/// - `(project_id, name)` is unique: concurrent lazy creation of the same
///   branch converges on a single row.
/// - Tip movement goes through the conditional advance query only.
async fn init_branches_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing branches table");

    let sql = r#"
        DEFINE TABLE branches
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX idx_branch_project_name ON TABLE branches COLUMNS project_id, name UNIQUE;

        -- Index project for branch listings
        DEFINE INDEX idx_branch_project ON TABLE branches COLUMNS project_id;

        -- Index tip for reverse lookups
        DEFINE INDEX idx_branch_tip ON TABLE branches COLUMNS latest_commit_id;
    "#;

    db.query(sql)
        .await
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?;
    info!("✓ branches table initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    // Note: Full integration tests for migrations are in atelier-state/tests/
    // These verify actual schema creation and constraint behavior
}
