//! Schema definitions for Atelier SurrealDB tables
//!
//! Tables:
//! - blobs: Content-addressed project source payloads
//! - commits: Version control commits (graph nodes)
//! - branches: Per-project branch pointers to commit ids
//!
//! Row types convert to/from the `storage_traits` records at the backend
//! boundary; nothing outside this crate sees a SurrealDB type.

use chrono::{DateTime, Utc};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::storage_traits::{
    BlobRecord, BranchRecord, CommitId, CommitRecord, ContentDigest, StorageResult,
};

/// Blob row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbBlob {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    /// SHA-256 hex of the payload (primary key)
    pub content_hash: String,
    /// Project source text
    pub payload: String,
    /// User that first stored this payload
    pub creator_user_id: String,
    /// First-write timestamp
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl DbBlob {
    pub fn new(content_hash: &ContentDigest, payload: &str, creator_user_id: &str) -> Self {
        DbBlob {
            id: None,
            content_hash: content_hash.as_str().to_string(),
            payload: payload.to_string(),
            creator_user_id: creator_user_id.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn into_record(self) -> StorageResult<BlobRecord> {
        Ok(BlobRecord {
            content_hash: ContentDigest::try_from(self.content_hash)?,
            payload: self.payload,
            creator_user_id: self.creator_user_id,
            created_at: self.created_at,
        })
    }
}

/// Commit row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbCommit {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    /// Content-derived commit hash (unique)
    pub commit_id: String,
    pub project_id: String,
    pub branch_name: String,
    pub author_user_id: String,
    /// Reference into the blobs table
    pub blob_hash: String,
    pub message: String,
    pub description: String,
    /// Typed extension metadata
    pub metadata: BTreeMap<String, String>,
    /// Absent for root commits
    pub parent_commit_id: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    /// Cached ancestor count; absent until backfilled
    pub depth: Option<i64>,
}

impl DbCommit {
    pub fn from_record(record: &CommitRecord) -> Self {
        DbCommit {
            id: None,
            commit_id: record.commit_id.as_str().to_string(),
            project_id: record.project_id.clone(),
            branch_name: record.branch_name.clone(),
            author_user_id: record.author_user_id.clone(),
            blob_hash: record.blob_hash.as_str().to_string(),
            message: record.message.clone(),
            description: record.description.clone(),
            metadata: record.metadata.clone(),
            parent_commit_id: record.parent_commit_id.as_ref().map(|p| p.as_str().to_string()),
            created_at: record.created_at,
            depth: record.depth,
        }
    }

    pub fn into_record(self) -> StorageResult<CommitRecord> {
        Ok(CommitRecord {
            commit_id: CommitId(self.commit_id),
            project_id: self.project_id,
            branch_name: self.branch_name,
            author_user_id: self.author_user_id,
            blob_hash: ContentDigest::try_from(self.blob_hash)?,
            message: self.message,
            description: self.description,
            metadata: self.metadata,
            parent_commit_id: self.parent_commit_id.map(CommitId),
            created_at: self.created_at,
            depth: self.depth,
        })
    }
}

/// Branch row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbBranch {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    pub project_id: String,
    /// Unique within the project
    pub name: String,
    pub creator_user_id: String,
    pub description: String,
    /// Absent until the first commit lands
    pub latest_commit_id: Option<String>,
    pub protected: bool,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl DbBranch {
    pub fn from_record(record: &BranchRecord) -> Self {
        DbBranch {
            id: None,
            project_id: record.project_id.clone(),
            name: record.name.clone(),
            creator_user_id: record.creator_user_id.clone(),
            description: record.description.clone(),
            latest_commit_id: record.latest_commit_id.as_ref().map(|c| c.as_str().to_string()),
            protected: record.protected,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn into_record(self) -> BranchRecord {
        BranchRecord {
            project_id: self.project_id,
            name: self.name,
            creator_user_id: self.creator_user_id,
            description: self.description,
            latest_commit_id: self.latest_commit_id.map(CommitId),
            protected: self.protected,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_commit_round_trip() {
        let blob = ContentDigest::from_bytes(b"sprite source");
        let record = CommitRecord {
            commit_id: CommitId("ab".repeat(32)),
            project_id: "p1".to_string(),
            branch_name: "main".to_string(),
            author_user_id: "alice".to_string(),
            blob_hash: blob,
            message: "init".to_string(),
            description: "first revision".to_string(),
            metadata: BTreeMap::from([("client".to_string(), "web".to_string())]),
            parent_commit_id: None,
            created_at: Utc::now(),
            depth: Some(0),
        };

        let row = DbCommit::from_record(&record);
        assert!(row.parent_commit_id.is_none());

        let back = row.into_record().unwrap();
        assert_eq!(back.commit_id, record.commit_id);
        assert_eq!(back.metadata.get("client").map(String::as_str), Some("web"));
        assert_eq!(back.depth, Some(0));
    }

    #[test]
    fn test_db_branch_round_trip_preserves_null_tip() {
        let record = BranchRecord::new("p1", "main", "alice");
        let row = DbBranch::from_record(&record);
        assert!(row.latest_commit_id.is_none());
        let back = row.into_record();
        assert!(back.latest_commit_id.is_none());
    }

    #[test]
    fn test_db_blob_rejects_corrupt_hash_on_read() {
        let row = DbBlob {
            id: None,
            content_hash: "zz".to_string(),
            payload: "x".to_string(),
            creator_user_id: "alice".to_string(),
            created_at: Utc::now(),
        };
        assert!(row.into_record().is_err());
    }
}
