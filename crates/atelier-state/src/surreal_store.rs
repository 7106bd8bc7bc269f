//! SurrealDB-backed implementation of the storage traits
//!
//! `SurrealRevisionStore` implements `BlobStore`, `CommitStore`, and
//! `BranchStore` over one connection, using `schema::Db*` rows for
//! persistence and converting to/from `storage_traits` types at the
//! boundary.
//!
//! Supports both local (in-memory) and cloud (WebSocket) connections.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{DbBlob, DbBranch, DbCommit};
use crate::storage_traits::{
    AdvanceOutcome, BlobStore, BranchRecord, BranchStore, CommitId, CommitRecord, CommitStore,
    ContentDigest, StorageResult,
};

/// Configuration for SurrealDB Cloud connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    /// Database username
    pub username: String,
    /// Database password
    pub password: String,
    /// Namespace (default: "atelier")
    pub namespace: String,
    /// Database name (default: "vcs")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create a new cloud configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: "atelier".to_string(),
            database: "vcs".to_string(),
            is_root: false,
        }
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Set whether this is a root user
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "atelier")
    /// - SURREALDB_DATABASE (optional, default: "vcs")
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace =
            std::env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "atelier".to_string());
        let database = std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "vcs".to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// SurrealDB-backed revision store for Atelier version control.
#[derive(Clone)]
pub struct SurrealRevisionStore {
    db: Surreal<Any>,
}

impl SurrealRevisionStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `atelier/vcs`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect("mem://")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        db.use_ns("atelier")
            .use_db("vcs")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!("SurrealRevisionStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Connect to SurrealDB Cloud
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace))]
    pub async fn connect_cloud(config: CloudConfig) -> crate::Result<Self> {
        info!("Connecting to SurrealDB Cloud (root={})", config.is_root);

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| {
                StateError::Connection(format!("Database authentication failed: {}", e))
            })?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to select namespace/database: {}", e))
            })?;

        migrations::init_schema(&db).await?;

        info!("SurrealRevisionStore connected (cloud)");
        Ok(Self { db })
    }

    /// Connect using environment variables.
    ///
    /// If SURREALDB_ENDPOINT is set, connects to cloud.
    /// If SURREALDB_URL is set, connects to that URL.
    /// Otherwise, falls back to local persistence in `.atelier/db`.
    pub async fn from_env() -> crate::Result<Self> {
        if let Ok(config) = CloudConfig::from_env() {
            info!("Cloud config found, connecting to SurrealDB Cloud");
            return Self::connect_cloud(config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            info!("SURREALDB_URL found, connecting to {}", url);
            let db = surrealdb::engine::any::connect(&url)
                .await
                .map_err(|e| StateError::Connection(e.to_string()))?;

            db.use_ns("atelier")
                .use_db("vcs")
                .await
                .map_err(|e| StateError::Connection(e.to_string()))?;

            migrations::init_schema(&db).await?;
            return Ok(Self { db });
        }

        let path = ".atelier/db";
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
        let url = format!("surrealkv://{}", path);
        info!(
            "No cloud config or SURREALDB_URL found, using local persistence: {}",
            url
        );

        let db = surrealdb::engine::any::connect(&url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns("atelier")
            .use_db("vcs")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_blob(&self, hash: &str) -> StorageResult<Option<DbBlob>> {
        let hash_owned = hash.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM blobs WHERE content_hash = $hash")
            .bind(("hash", hash_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<DbBlob> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_commit(&self, commit_id: &str) -> StorageResult<Option<DbCommit>> {
        let id_owned = commit_id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM commits WHERE commit_id = $id")
            .bind(("id", id_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<DbCommit> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_branch(&self, project_id: &str, name: &str) -> StorageResult<Option<DbBranch>> {
        let project_owned = project_id.to_string();
        let name_owned = name.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM branches WHERE project_id = $project AND name = $name")
            .bind(("project", project_owned))
            .bind(("name", name_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<DbBranch> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl BlobStore for SurrealRevisionStore {
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn put(&self, payload: &str, creator_user_id: &str) -> StorageResult<ContentDigest> {
        let digest = ContentDigest::from_bytes(payload.as_bytes());

        if self.fetch_blob(digest.as_str()).await?.is_some() {
            debug!(digest = %digest.short(), "blob already stored");
            return Ok(digest);
        }

        let row = DbBlob::new(&digest, payload, creator_user_id);
        let created: Result<Option<DbBlob>, _> = self.db.create("blobs").content(row).await;

        match created {
            Ok(_) => Ok(digest),
            // A concurrent writer of the same payload may have won the unique
            // index; both callers must observe the same digest.
            Err(e) => {
                if self.fetch_blob(digest.as_str()).await?.is_some() {
                    Ok(digest)
                } else {
                    Err(StorageError::Backend(e.to_string()))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, digest: &ContentDigest) -> StorageResult<String> {
        self.fetch_blob(digest.as_str())
            .await?
            .map(|b| b.payload)
            .ok_or_else(|| StorageError::BlobNotFound {
                digest: digest.as_str().to_string(),
            })
    }

    async fn contains(&self, digest: &ContentDigest) -> StorageResult<bool> {
        Ok(self.fetch_blob(digest.as_str()).await?.is_some())
    }
}

#[async_trait]
impl CommitStore for SurrealRevisionStore {
    #[instrument(skip(self, record), fields(commit_id = %record.commit_id.short()))]
    async fn insert(&self, record: CommitRecord) -> StorageResult<CommitRecord> {
        let row = DbCommit::from_record(&record);

        let _created: Option<DbCommit> = self
            .db
            .create("commits")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        debug!("commit row persisted");
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn remove(&self, commit_id: &CommitId) -> StorageResult<()> {
        let id_owned = commit_id.as_str().to_string();
        self.db
            .query("DELETE FROM commits WHERE commit_id = $id")
            .bind(("id", id_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_commit(&self, commit_id: &CommitId) -> StorageResult<Option<CommitRecord>> {
        match self.fetch_commit(commit_id.as_str()).await? {
            Some(row) => Ok(Some(row.into_record()?)),
            None => Ok(None),
        }
    }

    async fn get_many(&self, commit_ids: &[CommitId]) -> StorageResult<Vec<CommitRecord>> {
        if commit_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = commit_ids.iter().map(|c| c.as_str().to_string()).collect();
        let mut res = self
            .db
            .query("SELECT * FROM commits WHERE commit_id IN $ids")
            .bind(("ids", ids))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<DbCommit> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(DbCommit::into_record).collect()
    }

    #[instrument(skip(self))]
    async fn list_up_to_depth(
        &self,
        project_id: &str,
        max_depth: i64,
    ) -> StorageResult<Vec<CommitRecord>> {
        let project_owned = project_id.to_string();
        let mut res = self
            .db
            .query(
                "SELECT * FROM commits \
                 WHERE project_id = $project AND depth != NONE AND depth <= $max \
                 ORDER BY created_at DESC",
            )
            .bind(("project", project_owned))
            .bind(("max", max_depth))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<DbCommit> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(DbCommit::into_record).collect()
    }

    async fn list_missing_depth(&self, project_id: &str) -> StorageResult<Vec<CommitId>> {
        let project_owned = project_id.to_string();
        let mut res = self
            .db
            .query("SELECT commit_id FROM commits WHERE project_id = $project AND depth = NONE")
            .bind(("project", project_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        #[derive(serde::Deserialize)]
        struct IdRow {
            commit_id: String,
        }

        let rows: Vec<IdRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().map(|r| CommitId(r.commit_id)).collect())
    }

    #[instrument(skip(self))]
    async fn fill_depth(&self, commit_id: &CommitId, depth: i64) -> StorageResult<bool> {
        let id_owned = commit_id.as_str().to_string();
        let mut res = self
            .db
            .query(
                "UPDATE commits SET depth = $depth \
                 WHERE commit_id = $id AND depth = NONE RETURN AFTER",
            )
            .bind(("id", id_owned))
            .bind(("depth", depth))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<DbCommit> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if rows.is_empty() {
            // Row absent, or depth already populated by a concurrent writer.
            if self.fetch_commit(commit_id.as_str()).await?.is_none() {
                return Err(StorageError::CommitNotFound {
                    commit_id: commit_id.as_str().to_string(),
                });
            }
            return Ok(false);
        }
        Ok(true)
    }
}

#[async_trait]
impl BranchStore for SurrealRevisionStore {
    #[instrument(skip(self))]
    async fn ensure(
        &self,
        project_id: &str,
        name: &str,
        creator_user_id: &str,
    ) -> StorageResult<BranchRecord> {
        if let Some(row) = self.fetch_branch(project_id, name).await? {
            return Ok(row.into_record());
        }

        let record = BranchRecord::new(project_id, name, creator_user_id);
        let row = DbBranch::from_record(&record);
        let created: Result<Option<DbBranch>, _> = self.db.create("branches").content(row).await;

        match created {
            Ok(_) => Ok(record),
            // Lost a creation race on the unique (project_id, name) index;
            // the branch now exists, so return the winner's row.
            Err(e) => match self.fetch_branch(project_id, name).await? {
                Some(row) => Ok(row.into_record()),
                None => Err(StorageError::Backend(e.to_string())),
            },
        }
    }

    async fn get_branch(&self, project_id: &str, name: &str) -> StorageResult<Option<BranchRecord>> {
        Ok(self
            .fetch_branch(project_id, name)
            .await?
            .map(DbBranch::into_record))
    }

    async fn list(&self, project_id: &str) -> StorageResult<Vec<BranchRecord>> {
        let project_owned = project_id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM branches WHERE project_id = $project ORDER BY name")
            .bind(("project", project_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<DbBranch> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().map(DbBranch::into_record).collect())
    }

    #[instrument(skip(self, record), fields(project_id = %record.project_id, name = %record.name))]
    async fn create(&self, record: BranchRecord) -> StorageResult<BranchRecord> {
        if self
            .fetch_branch(&record.project_id, &record.name)
            .await?
            .is_some()
        {
            return Err(StorageError::DuplicateBranch {
                project_id: record.project_id,
                name: record.name,
            });
        }

        let row = DbBranch::from_record(&record);
        let created: Result<Option<DbBranch>, _> = self.db.create("branches").content(row).await;

        match created {
            Ok(_) => Ok(record),
            Err(e) => {
                if self
                    .fetch_branch(&record.project_id, &record.name)
                    .await?
                    .is_some()
                {
                    Err(StorageError::DuplicateBranch {
                        project_id: record.project_id,
                        name: record.name,
                    })
                } else {
                    Err(StorageError::Backend(e.to_string()))
                }
            }
        }
    }

    #[instrument(skip(self, expected_tip, new_tip), fields(new_tip = %new_tip.short()))]
    async fn advance(
        &self,
        project_id: &str,
        name: &str,
        expected_tip: Option<&CommitId>,
        new_tip: &CommitId,
    ) -> StorageResult<AdvanceOutcome> {
        let project_owned = project_id.to_string();
        let name_owned = name.to_string();
        let new_owned = new_tip.as_str().to_string();
        let now = SurrealDatetime::from(chrono::Utc::now());

        let mut res = if let Some(expected) = expected_tip {
            let expected_owned = expected.as_str().to_string();
            self.db
                .query(
                    "UPDATE branches SET latest_commit_id = $new, updated_at = $now \
                     WHERE project_id = $project AND name = $name \
                     AND latest_commit_id = $expected RETURN AFTER",
                )
                .bind(("project", project_owned))
                .bind(("name", name_owned))
                .bind(("expected", expected_owned))
                .bind(("new", new_owned))
                .bind(("now", now))
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            self.db
                .query(
                    "UPDATE branches SET latest_commit_id = $new, updated_at = $now \
                     WHERE project_id = $project AND name = $name \
                     AND latest_commit_id = NONE RETURN AFTER",
                )
                .bind(("project", project_owned))
                .bind(("name", name_owned))
                .bind(("new", new_owned))
                .bind(("now", now))
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        let rows: Vec<DbBranch> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if !rows.is_empty() {
            return Ok(AdvanceOutcome::Advanced);
        }

        // Nothing matched: distinguish a missing branch from a lost race.
        if self.fetch_branch(project_id, name).await?.is_none() {
            return Err(StorageError::BranchNotFound {
                project_id: project_id.to_string(),
                name: name.to_string(),
            });
        }
        Ok(AdvanceOutcome::Conflict)
    }
}
