//! SQLite Metadata Store
//!
//! Repository, commit, tag and file-manifest records kept in SQLite through
//! sqlx.
//!
//! ## Database Schema
//!
//! - `repositories`: one row per `(owner, name)`
//! - `commits`: immutable versions; `seq` orders them within a repository
//! - `tags`: named pointers to commits
//! - `file_manifests`: manifest digest of each commit
//!
//! The write methods exist for publishing tools and tests; the resolver only
//! uses the [`MetadataStore`] lookups.

use crate::buildconfig::DEFAULT_REFERENCE;
use crate::error::{RegistryError, Result};
use crate::metadata::{Commit, ManifestRecord, MetadataStore, Repository};
use crate::storage::Digest;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS repositories (
        id TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE (owner, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS commits (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        repository_id TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE (repository_id, name),
        FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        repository_id TEXT NOT NULL,
        name TEXT NOT NULL,
        commit_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (repository_id, name),
        FOREIGN KEY (commit_id) REFERENCES commits(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS file_manifests (
        commit_id TEXT PRIMARY KEY,
        digest TEXT NOT NULL,
        FOREIGN KEY (commit_id) REFERENCES commits(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_commits_repository ON commits(repository_id, seq)",
];

/// SQLite-backed metadata store.
#[derive(Debug, Clone)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `database_path` and apply the schema.
    pub async fn new(database_path: &Path, max_connections: u32) -> Result<Self> {
        if let Some(parent) = database_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RegistryError::io_error(
                    format!("Failed to create metadata directory: {}", e),
                    Some(parent.to_path_buf()),
                )
            })?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", database_path.display());
        info!(path = %database_path.display(), "Initializing metadata store");

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(&db_url)
            .await
            .map_err(|e| {
                RegistryError::database_error(format!("Failed to connect to database: {}", e))
            })?;

        // WAL lets lookups proceed while a publish is writing
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await
            .map_err(|e| RegistryError::database_error(format!("Failed to enable WAL mode: {}", e)))?;
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .map_err(|e| {
                RegistryError::database_error(format!("Failed to enable foreign keys: {}", e))
            })?;

        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await.map_err(|e| {
                RegistryError::database_error(format!("Failed to apply schema: {}", e))
            })?;
        }
        info!("Metadata schema initialized");
        Ok(())
    }

    pub async fn create_repository(&self, owner: &str, name: &str) -> Result<Repository> {
        let repository = Repository {
            id: Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
        };

        sqlx::query("INSERT INTO repositories (id, owner, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(&repository.id)
            .bind(&repository.owner)
            .bind(&repository.name)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                RegistryError::database_error(format!(
                    "Failed to create repository {}/{}: {}",
                    owner, name, e
                ))
            })?;

        debug!(id = %repository.id, owner = %owner, name = %name, "Created repository");
        Ok(repository)
    }

    /// Record a commit and the manifest it points at, atomically.
    pub async fn insert_commit(
        &self,
        repository_id: &str,
        name: &str,
        manifest_digest: &Digest,
    ) -> Result<Commit> {
        let commit = Commit {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            repository_id: repository_id.to_string(),
        };

        let mut tx = self.pool.begin().await.map_err(|e| {
            RegistryError::database_error(format!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query("INSERT INTO commits (id, repository_id, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(&commit.id)
            .bind(&commit.repository_id)
            .bind(&commit.name)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                RegistryError::database_error(format!("Failed to insert commit {}: {}", name, e))
            })?;

        sqlx::query("INSERT INTO file_manifests (commit_id, digest) VALUES (?, ?)")
            .bind(&commit.id)
            .bind(manifest_digest.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                RegistryError::database_error(format!(
                    "Failed to insert manifest record for {}: {}",
                    name, e
                ))
            })?;

        tx.commit().await.map_err(|e| {
            RegistryError::database_error(format!("Failed to commit transaction: {}", e))
        })?;

        debug!(
            commit = %commit.name,
            repository_id = %repository_id,
            manifest = %manifest_digest,
            "Inserted commit"
        );
        Ok(commit)
    }

    /// Point `tag` at `commit_id`, moving it if it already exists.
    pub async fn create_tag(&self, repository_id: &str, tag: &str, commit_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tags (repository_id, name, commit_id, created_at) VALUES (?, ?, ?, ?)
            ON CONFLICT (repository_id, name) DO UPDATE SET commit_id = excluded.commit_id
            "#,
        )
        .bind(repository_id)
        .bind(tag)
        .bind(commit_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| RegistryError::database_error(format!("Failed to create tag {}: {}", tag, e)))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn commit_from_row(row: &SqliteRow) -> Commit {
        Commit {
            id: row.get("id"),
            name: row.get("name"),
            repository_id: row.get("repository_id"),
        }
    }

    async fn commit_by_name(&self, repository_id: &str, name: &str) -> Result<Option<Commit>> {
        let row = sqlx::query("SELECT id, name, repository_id FROM commits WHERE repository_id = ? AND name = ?")
            .bind(repository_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RegistryError::database_error(format!("Failed to query commit: {}", e)))?;
        Ok(row.as_ref().map(Self::commit_from_row))
    }

    async fn commit_by_tag(&self, repository_id: &str, tag: &str) -> Result<Option<Commit>> {
        let row = sqlx::query(
            r#"
            SELECT c.id, c.name, c.repository_id
            FROM tags t JOIN commits c ON c.id = t.commit_id
            WHERE t.repository_id = ? AND t.name = ?
            "#,
        )
        .bind(repository_id)
        .bind(tag)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegistryError::database_error(format!("Failed to query tag: {}", e)))?;
        Ok(row.as_ref().map(Self::commit_from_row))
    }

    async fn latest_commit(&self, repository_id: &str) -> Result<Option<Commit>> {
        let row = sqlx::query(
            "SELECT id, name, repository_id FROM commits WHERE repository_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(repository_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegistryError::database_error(format!("Failed to query latest commit: {}", e)))?;
        Ok(row.as_ref().map(Self::commit_from_row))
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn find_repository(&self, owner: &str, name: &str) -> Result<Option<Repository>> {
        let row = sqlx::query("SELECT id, owner, name FROM repositories WHERE owner = ? AND name = ?")
            .bind(owner)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                RegistryError::database_error(format!("Failed to query repository: {}", e))
            })?;

        Ok(row.map(|r| Repository {
            id: r.get("id"),
            owner: r.get("owner"),
            name: r.get("name"),
        }))
    }

    async fn find_commit(&self, repository_id: &str, reference: &str) -> Result<Option<Commit>> {
        if let Some(commit) = self.commit_by_name(repository_id, reference).await? {
            return Ok(Some(commit));
        }
        if let Some(commit) = self.commit_by_tag(repository_id, reference).await? {
            return Ok(Some(commit));
        }
        if reference == DEFAULT_REFERENCE {
            return self.latest_commit(repository_id).await;
        }
        Ok(None)
    }

    async fn find_manifest_record(&self, commit_id: &str) -> Result<Option<ManifestRecord>> {
        let row = sqlx::query("SELECT commit_id, digest FROM file_manifests WHERE commit_id = ?")
            .bind(commit_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                RegistryError::database_error(format!("Failed to query manifest record: {}", e))
            })?;

        row.map(|r| {
            let digest: String = r.get("digest");
            Ok(ManifestRecord {
                commit_id: r.get("commit_id"),
                digest: Digest::parse(&digest)?,
            })
        })
        .transpose()
    }
}
