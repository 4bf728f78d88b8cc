//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{
    AccessRepo, AdminMarkerRepo, BlockRepo, ChunkRepo, CommitRepo, ProjectRepo, TokenRepo,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    BlockRepo
    + ChunkRepo
    + ProjectRepo
    + CommitRepo
    + AccessRepo
    + TokenRepo
    + AdminMarkerRepo
    + Send
    + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single connection serializes writers, which also serializes
            // sequence number assignment.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::info!(path = %path.display(), "opened sqlite metadata store");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::compose::blocks_compose;
    use crate::models::*;
    use crate::repos::{CommitWrite, RestoreWrite};
    use crate::snapshot::{distinct_hashes, plan_restore};
    use hangar_core::{AccessLevel, INITIAL_COMMIT_MESSAGE, InsertOutcome};
    use sqlx::SqliteConnection;
    use std::collections::HashMap;
    use time::OffsetDateTime;
    use uuid::Uuid;

    /// Chunk count of a file when it is in the catalog.
    async fn complete_chunk_count(
        conn: &mut SqliteConnection,
        file_hash: &str,
    ) -> MetadataResult<Option<i64>> {
        let (registered, chunk_count): (i64, Option<i64>) =
            sqlx::query_as("SELECT COUNT(*), MAX(chunk_count) FROM chunks WHERE file_hash = ?")
                .bind(file_hash)
                .fetch_one(&mut *conn)
                .await?;
        Ok(chunk_count.filter(|&count| registered > 0 && registered == count))
    }

    async fn resolve_state(
        conn: &mut SqliteConnection,
        project_id: i64,
        at_commit_id: i64,
    ) -> MetadataResult<Vec<FileRevisionRow>> {
        let rows = sqlx::query_as::<_, FileRevisionRow>(
            r#"
            SELECT r.* FROM file_revisions r
            JOIN (
                SELECT path, MAX(revision_id) AS revision_id
                FROM file_revisions
                WHERE project_id = ? AND commit_id <= ?
                GROUP BY path
            ) latest ON latest.revision_id = r.revision_id
            WHERE r.change_kind <> 3
            "#,
        )
        .bind(project_id)
        .bind(at_commit_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }

    async fn insert_commit(
        conn: &mut SqliteConnection,
        project_id: i64,
        author_id: &str,
        comment: &str,
        file_count: i64,
        created_at: OffsetDateTime,
    ) -> MetadataResult<CommitRow> {
        let sequence_number: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM commits WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query_as::<_, CommitRow>(
            r#"
            INSERT INTO commits (project_id, author_id, comment, file_count, sequence_number, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(author_id)
        .bind(comment)
        .bind(file_count)
        .bind(sequence_number)
        .bind(created_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            MetadataError::classify(
                e,
                format!("commit #{sequence_number} of project {project_id}"),
            )
        })
    }

    async fn insert_revision(
        conn: &mut SqliteConnection,
        commit: &CommitRow,
        revision: &NewRevision,
        chunk_count: i64,
    ) -> MetadataResult<FileRevisionRow> {
        let row = sqlx::query_as::<_, FileRevisionRow>(
            r#"
            INSERT INTO file_revisions (project_id, path, commit_id, content_hash, change_kind, chunk_count)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(commit.project_id)
        .bind(&revision.path)
        .bind(commit.commit_id)
        .bind(&revision.content_hash)
        .bind(revision.change_kind.code())
        .bind(chunk_count)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    #[async_trait]
    impl BlockRepo for SqliteStore {
        async fn put_block(&self, block: &BlockRow) -> MetadataResult<InsertOutcome> {
            let result = sqlx::query(
                r#"
                INSERT INTO blocks (block_hash, storage_key, size, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(block_hash) DO NOTHING
                "#,
            )
            .bind(&block.block_hash)
            .bind(&block.storage_key)
            .bind(block.size)
            .bind(block.created_at)
            .execute(&self.pool)
            .await?;
            Ok(InsertOutcome::from_inserted(result.rows_affected() > 0))
        }

        async fn get_block(&self, block_hash: &str) -> MetadataResult<Option<BlockRow>> {
            let row = sqlx::query_as::<_, BlockRow>("SELECT * FROM blocks WHERE block_hash = ?")
                .bind(block_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn delete_block(&self, block_hash: &str) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM blocks WHERE block_hash = ?")
                .bind(block_hash)
                .execute(&self.pool)
                .await
                .map_err(|e| MetadataError::classify(e, format!("block {block_hash}")))?;
            Ok(result.rows_affected() > 0)
        }
    }

    #[async_trait]
    impl ChunkRepo for SqliteStore {
        async fn register_chunk(
            &self,
            uploader_id: &str,
            chunk: &ChunkRow,
        ) -> MetadataResult<InsertOutcome> {
            if chunk.chunk_index < 0 || chunk.chunk_index >= chunk.chunk_count {
                return Err(MetadataError::Constraint(format!(
                    "chunk index {} outside 0..{} for file {}",
                    chunk.chunk_index, chunk.chunk_count, chunk.file_hash
                )));
            }

            let mut tx = self.pool.begin().await?;

            let catalogued: Option<i64> =
                sqlx::query_scalar("SELECT chunk_count FROM chunks WHERE file_hash = ? LIMIT 1")
                    .bind(&chunk.file_hash)
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(count) = catalogued {
                if count != chunk.chunk_count {
                    return Err(MetadataError::Constraint(format!(
                        "file {} registered with {count} chunks, got {}",
                        chunk.file_hash, chunk.chunk_count
                    )));
                }
                let block_hash: String = sqlx::query_scalar(
                    "SELECT block_hash FROM chunks WHERE file_hash = ? AND chunk_index = ?",
                )
                .bind(&chunk.file_hash)
                .bind(chunk.chunk_index)
                .fetch_one(&mut *tx)
                .await?;
                if block_hash != chunk.block_hash {
                    return Err(MetadataError::Constraint(format!(
                        "file {} has block {block_hash} at index {}",
                        chunk.file_hash, chunk.chunk_index
                    )));
                }
                // Positions staged before the file was catalogued are no longer needed.
                sqlx::query("DELETE FROM pending_chunks WHERE uploader_id = ? AND file_hash = ?")
                    .bind(uploader_id)
                    .bind(&chunk.file_hash)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                return Ok(InsertOutcome::AlreadyExists);
            }

            // A different chunk count restarts the uploader's staged set.
            sqlx::query(
                "DELETE FROM pending_chunks WHERE uploader_id = ? AND file_hash = ? AND chunk_count <> ?",
            )
            .bind(uploader_id)
            .bind(&chunk.file_hash)
            .bind(chunk.chunk_count)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO pending_chunks (uploader_id, file_hash, chunk_index, block_hash, block_size, chunk_count, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(uploader_id, file_hash, chunk_index) DO UPDATE
                SET block_hash = excluded.block_hash,
                    block_size = excluded.block_size,
                    created_at = excluded.created_at
                "#,
            )
            .bind(uploader_id)
            .bind(&chunk.file_hash)
            .bind(chunk.chunk_index)
            .bind(&chunk.block_hash)
            .bind(chunk.block_size)
            .bind(chunk.chunk_count)
            .bind(chunk.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| MetadataError::classify(e, format!("block {}", chunk.block_hash)))?;

            let staged = sqlx::query_as::<_, ChunkRow>(
                r#"
                SELECT file_hash, chunk_index, block_hash, block_size, chunk_count, created_at
                FROM pending_chunks
                WHERE uploader_id = ? AND file_hash = ?
                ORDER BY chunk_index
                "#,
            )
            .bind(uploader_id)
            .bind(&chunk.file_hash)
            .fetch_all(&mut *tx)
            .await?;

            if staged.len() as i64 == chunk.chunk_count {
                sqlx::query("DELETE FROM pending_chunks WHERE uploader_id = ? AND file_hash = ?")
                    .bind(uploader_id)
                    .bind(&chunk.file_hash)
                    .execute(&mut *tx)
                    .await?;

                let blocks = staged.iter().map(|c| c.block_hash.as_str());
                if !blocks_compose(&chunk.file_hash, blocks) {
                    tx.commit().await?;
                    tracing::warn!(
                        file_hash = %chunk.file_hash,
                        uploader_id,
                        "staged blocks do not compose file hash"
                    );
                    return Err(MetadataError::Constraint(format!(
                        "blocks uploaded for file {} do not compose its hash",
                        chunk.file_hash
                    )));
                }

                for row in &staged {
                    sqlx::query(
                        r#"
                        INSERT INTO chunks (file_hash, chunk_index, block_hash, block_size, chunk_count, created_at)
                        VALUES (?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&row.file_hash)
                    .bind(row.chunk_index)
                    .bind(&row.block_hash)
                    .bind(row.block_size)
                    .bind(row.chunk_count)
                    .bind(row.created_at)
                    .execute(&mut *tx)
                    .await?;
                }
                tracing::debug!(
                    file_hash = %chunk.file_hash,
                    chunks = staged.len(),
                    "file catalogued"
                );
            }

            tx.commit().await?;
            Ok(InsertOutcome::Inserted)
        }

        async fn list_chunks(&self, file_hash: &str) -> MetadataResult<Vec<ChunkRow>> {
            let rows = sqlx::query_as::<_, ChunkRow>(
                "SELECT * FROM chunks WHERE file_hash = ? ORDER BY chunk_index",
            )
            .bind(file_hash)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_registered_chunks(&self, file_hash: &str) -> MetadataResult<i64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE file_hash = ?")
                .bind(file_hash)
                .fetch_one(&self.pool)
                .await?;
            Ok(count)
        }

        async fn count_staged_chunks(
            &self,
            uploader_id: &str,
            file_hash: &str,
        ) -> MetadataResult<i64> {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM pending_chunks WHERE uploader_id = ? AND file_hash = ?",
            )
            .bind(uploader_id)
            .bind(file_hash)
            .fetch_one(&self.pool)
            .await?;
            Ok(count)
        }

        async fn is_file_complete(&self, file_hash: &str) -> MetadataResult<bool> {
            let mut conn = self.pool.acquire().await?;
            Ok(complete_chunk_count(&mut conn, file_hash).await?.is_some())
        }

        async fn missing_files(&self, file_hashes: &[String]) -> MetadataResult<Vec<String>> {
            let mut conn = self.pool.acquire().await?;
            let mut seen = std::collections::HashSet::new();
            let mut missing = Vec::new();
            for hash in file_hashes {
                if seen.insert(hash.as_str())
                    && complete_chunk_count(&mut conn, hash).await?.is_none()
                {
                    missing.push(hash.clone());
                }
            }
            Ok(missing)
        }
    }

    #[async_trait]
    impl ProjectRepo for SqliteStore {
        async fn create_project(
            &self,
            team_id: &str,
            title: &str,
            created_by: &str,
            created_at: OffsetDateTime,
        ) -> MetadataResult<ProjectRow> {
            let mut tx = self.pool.begin().await?;

            let project = sqlx::query_as::<_, ProjectRow>(
                r#"
                INSERT INTO projects (team_id, title, created_by, created_at)
                VALUES (?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(team_id)
            .bind(title)
            .bind(created_by)
            .bind(created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                MetadataError::classify(e, format!("project '{title}' in team '{team_id}'"))
            })?;

            sqlx::query(
                r#"
                INSERT INTO commits (project_id, author_id, comment, file_count, sequence_number, created_at)
                VALUES (?, ?, ?, 0, 1, ?)
                "#,
            )
            .bind(project.project_id)
            .bind(created_by)
            .bind(INITIAL_COMMIT_MESSAGE)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO project_permissions (user_id, project_id, level, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(created_by)
            .bind(project.project_id)
            .bind(AccessLevel::Owner.code())
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(project)
        }

        async fn get_project(&self, project_id: i64) -> MetadataResult<Option<ProjectRow>> {
            let row =
                sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE project_id = ?")
                    .bind(project_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn list_projects_for_user(&self, user_id: &str) -> MetadataResult<Vec<ProjectRow>> {
            let rows = sqlx::query_as::<_, ProjectRow>(
                r#"
                SELECT p.* FROM projects p
                WHERE EXISTS (
                    SELECT 1 FROM project_permissions pp
                    WHERE pp.project_id = p.project_id AND pp.user_id = ? AND pp.level >= 1
                ) OR EXISTS (
                    SELECT 1 FROM team_permissions tp
                    WHERE tp.team_id = p.team_id AND tp.user_id = ? AND tp.level >= 1
                )
                ORDER BY p.project_id
                "#,
            )
            .bind(user_id)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl CommitRepo for SqliteStore {
        async fn create_commit(&self, commit: &NewCommit) -> MetadataResult<CommitWrite> {
            let mut tx = self.pool.begin().await?;

            let row = insert_commit(
                &mut tx,
                commit.project_id,
                &commit.author_id,
                &commit.comment,
                commit.revisions.len() as i64,
                commit.created_at,
            )
            .await?;

            let mut chunk_counts = HashMap::new();
            let mut missing = Vec::new();
            for hash in distinct_hashes(&commit.revisions) {
                match complete_chunk_count(&mut tx, &hash).await? {
                    Some(count) => {
                        chunk_counts.insert(hash, count);
                    }
                    None => missing.push(hash),
                }
            }

            if !missing.is_empty() {
                tx.rollback().await?;
                return Ok(CommitWrite::MissingContent(missing));
            }

            for revision in &commit.revisions {
                let chunk_count = chunk_counts
                    .get(&revision.content_hash)
                    .copied()
                    .unwrap_or_default();
                insert_revision(&mut tx, &row, revision, chunk_count).await?;
            }

            tx.commit().await?;
            Ok(CommitWrite::Committed(row))
        }

        async fn get_commit(
            &self,
            project_id: i64,
            commit_id: i64,
        ) -> MetadataResult<Option<CommitRow>> {
            let row = sqlx::query_as::<_, CommitRow>(
                "SELECT * FROM commits WHERE project_id = ? AND commit_id = ?",
            )
            .bind(project_id)
            .bind(commit_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_commit_by_sequence(
            &self,
            project_id: i64,
            sequence_number: i64,
        ) -> MetadataResult<Option<CommitRow>> {
            let row = sqlx::query_as::<_, CommitRow>(
                "SELECT * FROM commits WHERE project_id = ? AND sequence_number = ?",
            )
            .bind(project_id)
            .bind(sequence_number)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn latest_commit(&self, project_id: i64) -> MetadataResult<Option<CommitRow>> {
            let row = sqlx::query_as::<_, CommitRow>(
                "SELECT * FROM commits WHERE project_id = ? ORDER BY sequence_number DESC LIMIT 1",
            )
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_commits(
            &self,
            project_id: i64,
            offset: i64,
            limit: i64,
        ) -> MetadataResult<Vec<CommitRow>> {
            let rows = sqlx::query_as::<_, CommitRow>(
                r#"
                SELECT * FROM commits
                WHERE project_id = ?
                ORDER BY sequence_number DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(project_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_commits(&self, project_id: i64) -> MetadataResult<i64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM commits WHERE project_id = ?")
                    .bind(project_id)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count)
        }

        async fn list_commit_revisions(
            &self,
            commit_id: i64,
        ) -> MetadataResult<Vec<FileRevisionRow>> {
            let rows = sqlx::query_as::<_, FileRevisionRow>(
                "SELECT * FROM file_revisions WHERE commit_id = ? ORDER BY revision_id",
            )
            .bind(commit_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn state_at(
            &self,
            project_id: i64,
            at_commit_id: i64,
        ) -> MetadataResult<Vec<FileRevisionRow>> {
            let mut conn = self.pool.acquire().await?;
            resolve_state(&mut conn, project_id, at_commit_id).await
        }

        async fn file_at(
            &self,
            project_id: i64,
            path: &str,
            at_commit_id: i64,
        ) -> MetadataResult<Option<FileRevisionRow>> {
            let row = sqlx::query_as::<_, FileRevisionRow>(
                r#"
                SELECT * FROM file_revisions
                WHERE project_id = ? AND path = ? AND commit_id <= ?
                ORDER BY revision_id DESC
                LIMIT 1
                "#,
            )
            .bind(project_id)
            .bind(path)
            .bind(at_commit_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.filter(|r| r.change_kind != hangar_core::ChangeKind::Delete.code()))
        }

        async fn restore_commit(
            &self,
            project_id: i64,
            target_commit_id: i64,
            author_id: &str,
            comment: &str,
            created_at: OffsetDateTime,
        ) -> MetadataResult<RestoreWrite> {
            let mut tx = self.pool.begin().await?;

            let target_exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM commits WHERE project_id = ? AND commit_id = ?)",
            )
            .bind(project_id)
            .bind(target_commit_id)
            .fetch_one(&mut *tx)
            .await?;
            if !target_exists {
                return Err(MetadataError::NotFound(format!(
                    "commit {target_commit_id} in project {project_id}"
                )));
            }

            let latest: i64 = sqlx::query_scalar(
                "SELECT commit_id FROM commits WHERE project_id = ? ORDER BY sequence_number DESC LIMIT 1",
            )
            .bind(project_id)
            .fetch_one(&mut *tx)
            .await?;

            let current = resolve_state(&mut tx, project_id, latest).await?;
            let target = resolve_state(&mut tx, project_id, target_commit_id).await?;
            let planned = plan_restore(&current, &target)?;

            let chunk_counts: HashMap<&str, i64> = current
                .iter()
                .chain(target.iter())
                .map(|r| (r.content_hash.as_str(), r.chunk_count))
                .collect();

            let commit = insert_commit(
                &mut tx,
                project_id,
                author_id,
                comment,
                planned.len() as i64,
                created_at,
            )
            .await?;

            let mut revisions = Vec::with_capacity(planned.len());
            for revision in &planned {
                let chunk_count = chunk_counts
                    .get(revision.content_hash.as_str())
                    .copied()
                    .unwrap_or_default();
                revisions.push(insert_revision(&mut tx, &commit, revision, chunk_count).await?);
            }

            tx.commit().await?;
            Ok(RestoreWrite { commit, revisions })
        }
    }

    #[async_trait]
    impl AccessRepo for SqliteStore {
        async fn project_access(
            &self,
            user_id: &str,
            project_id: i64,
        ) -> MetadataResult<AccessLevel> {
            let (project_level, team_level): (i32, i32) = sqlx::query_as(
                r#"
                SELECT
                    COALESCE((
                        SELECT level FROM project_permissions
                        WHERE user_id = ? AND project_id = ?
                    ), 0),
                    COALESCE((
                        SELECT MAX(tp.level) FROM team_permissions tp
                        JOIN projects p ON p.team_id = tp.team_id
                        WHERE tp.user_id = ? AND p.project_id = ?
                    ), 0)
                "#,
            )
            .bind(user_id)
            .bind(project_id)
            .bind(user_id)
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;

            Ok(AccessLevel::from_code(project_level)
                .max(AccessLevel::from_team_level(AccessLevel::from_code(team_level))))
        }

        async fn team_access(&self, user_id: &str, team_id: &str) -> MetadataResult<AccessLevel> {
            let level: Option<i32> = sqlx::query_scalar(
                "SELECT level FROM team_permissions WHERE user_id = ? AND team_id = ?",
            )
            .bind(user_id)
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(level.map_or(AccessLevel::None, AccessLevel::from_code))
        }

        async fn can_upload(&self, user_id: &str) -> MetadataResult<bool> {
            let allowed: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS(SELECT 1 FROM project_permissions WHERE user_id = ? AND level >= ?)
                    OR EXISTS(SELECT 1 FROM team_permissions WHERE user_id = ? AND level >= ?)
                "#,
            )
            .bind(user_id)
            .bind(AccessLevel::Write.code())
            .bind(user_id)
            .bind(AccessLevel::Write.code())
            .fetch_one(&self.pool)
            .await?;
            Ok(allowed)
        }

        async fn set_project_permission(
            &self,
            user_id: &str,
            project_id: i64,
            level: AccessLevel,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            if level == AccessLevel::None {
                sqlx::query("DELETE FROM project_permissions WHERE user_id = ? AND project_id = ?")
                    .bind(user_id)
                    .bind(project_id)
                    .execute(&self.pool)
                    .await?;
                return Ok(());
            }

            sqlx::query(
                r#"
                INSERT INTO project_permissions (user_id, project_id, level, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(user_id, project_id) DO UPDATE
                SET level = excluded.level, updated_at = excluded.updated_at
                "#,
            )
            .bind(user_id)
            .bind(project_id)
            .bind(level.code())
            .bind(updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| MetadataError::classify(e, format!("project {project_id}")))?;
            Ok(())
        }

        async fn set_team_permission(
            &self,
            user_id: &str,
            team_id: &str,
            level: AccessLevel,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            if level == AccessLevel::None {
                sqlx::query("DELETE FROM team_permissions WHERE user_id = ? AND team_id = ?")
                    .bind(user_id)
                    .bind(team_id)
                    .execute(&self.pool)
                    .await?;
                return Ok(());
            }

            sqlx::query(
                r#"
                INSERT INTO team_permissions (user_id, team_id, level, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(user_id, team_id) DO UPDATE
                SET level = excluded.level, updated_at = excluded.updated_at
                "#,
            )
            .bind(user_id)
            .bind(team_id)
            .bind(level.code())
            .bind(updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl TokenRepo for SqliteStore {
        async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO tokens (
                    token_id, user_id, token_hash, is_admin, expires_at,
                    revoked_at, created_at, last_used_at, description
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(token.token_id)
            .bind(&token.user_id)
            .bind(&token.token_hash)
            .bind(token.is_admin)
            .bind(token.expires_at)
            .bind(token.revoked_at)
            .bind(token.created_at)
            .bind(token.last_used_at)
            .bind(&token.description)
            .execute(&self.pool)
            .await
            .map_err(|e| MetadataError::classify(e, format!("token {}", token.token_id)))?;
            Ok(())
        }

        async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = ?")
                .bind(token_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET last_used_at = ? WHERE token_id = ?")
                .bind(used_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_token(
            &self,
            token_id: Uuid,
            revoked_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE tokens SET revoked_at = COALESCE(revoked_at, ?) WHERE token_id = ?",
            )
            .bind(revoked_at)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn list_tokens(&self, user_id: Option<&str>) -> MetadataResult<Vec<TokenRow>> {
            let rows = match user_id {
                Some(user_id) => {
                    sqlx::query_as::<_, TokenRow>(
                        "SELECT * FROM tokens WHERE user_id = ? ORDER BY created_at",
                    )
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens ORDER BY created_at")
                        .fetch_all(&self.pool)
                        .await?
                }
            };
            Ok(rows)
        }
    }

    #[async_trait]
    impl AdminMarkerRepo for SqliteStore {
        async fn admin_token_marker(&self) -> MetadataResult<Option<Uuid>> {
            let value: Option<Option<String>> =
                sqlx::query_scalar("SELECT admin_token_id FROM admin_state WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            value
                .flatten()
                .filter(|id| !id.is_empty())
                .map(|id| {
                    Uuid::parse_str(&id).map_err(|e| {
                        MetadataError::Internal(format!(
                            "invalid admin_token_id uuid '{id}': {e}"
                        ))
                    })
                })
                .transpose()
        }

        async fn set_admin_token_marker(&self, token_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO admin_state (id, admin_token_id)
                VALUES (1, ?)
                ON CONFLICT(id) DO UPDATE
                SET admin_token_id = excluded.admin_token_id
                "#,
            )
            .bind(token_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Content-addressed blocks
CREATE TABLE IF NOT EXISTS blocks (
    block_hash TEXT PRIMARY KEY,
    storage_key TEXT NOT NULL,
    size INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Ordered placement of blocks within files
CREATE TABLE IF NOT EXISTS chunks (
    file_hash TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    block_hash TEXT NOT NULL REFERENCES blocks(block_hash),
    block_size INTEGER NOT NULL,
    chunk_count INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (file_hash, chunk_index),
    CHECK (chunk_index >= 0 AND chunk_index < chunk_count)
);
CREATE INDEX IF NOT EXISTS idx_chunks_block ON chunks(block_hash);

-- Chunks staged per uploader until the file hash is verified
CREATE TABLE IF NOT EXISTS pending_chunks (
    uploader_id TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    block_hash TEXT NOT NULL REFERENCES blocks(block_hash),
    block_size INTEGER NOT NULL,
    chunk_count INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (uploader_id, file_hash, chunk_index),
    CHECK (chunk_index >= 0 AND chunk_index < chunk_count)
);
CREATE INDEX IF NOT EXISTS idx_pending_chunks_block ON pending_chunks(block_hash);

-- Projects
CREATE TABLE IF NOT EXISTS projects (
    project_id INTEGER PRIMARY KEY AUTOINCREMENT,
    team_id TEXT NOT NULL,
    title TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (team_id, title)
);

-- Commits, numbered per project
CREATE TABLE IF NOT EXISTS commits (
    commit_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(project_id),
    author_id TEXT NOT NULL,
    comment TEXT NOT NULL,
    file_count INTEGER NOT NULL,
    sequence_number INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (project_id, sequence_number)
);

-- Per-path changes recorded by commits
CREATE TABLE IF NOT EXISTS file_revisions (
    revision_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(project_id),
    path TEXT NOT NULL,
    commit_id INTEGER NOT NULL REFERENCES commits(commit_id),
    content_hash TEXT NOT NULL,
    change_kind INTEGER NOT NULL CHECK (change_kind IN (1, 2, 3)),
    chunk_count INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_revisions_path ON file_revisions(project_id, path, commit_id);
CREATE INDEX IF NOT EXISTS idx_file_revisions_commit ON file_revisions(commit_id);

-- Access grants
CREATE TABLE IF NOT EXISTS project_permissions (
    user_id TEXT NOT NULL,
    project_id INTEGER NOT NULL REFERENCES projects(project_id),
    level INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, project_id)
);

CREATE TABLE IF NOT EXISTS team_permissions (
    user_id TEXT NOT NULL,
    team_id TEXT NOT NULL,
    level INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, team_id)
);

-- API tokens
CREATE TABLE IF NOT EXISTS tokens (
    token_id BLOB PRIMARY KEY,
    user_id TEXT NOT NULL,
    token_hash TEXT NOT NULL UNIQUE,
    is_admin INTEGER NOT NULL DEFAULT 0,
    expires_at TEXT,
    revoked_at TEXT,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    description TEXT
);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);

-- Token created from the admin config
CREATE TABLE IF NOT EXISTS admin_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    admin_token_id TEXT
);
INSERT OR IGNORE INTO admin_state (id, admin_token_id) VALUES (1, NULL);
"#;
