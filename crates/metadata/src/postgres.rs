//! PostgreSQL-based metadata store implementation.

use crate::compose::blocks_compose;
use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{
    AccessRepo, AdminMarkerRepo, BlockRepo, ChunkRepo, CommitRepo, CommitWrite, ProjectRepo,
    RestoreWrite, TokenRepo,
};
use crate::snapshot::{distinct_hashes, plan_restore};
use crate::store::MetadataStore;
use async_trait::async_trait;
use hangar_core::config::PgSslMode;
use hangar_core::{AccessLevel, INITIAL_COMMIT_MESSAGE, InsertOutcome};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{PgConnection, Pool, Postgres};
use std::collections::HashMap;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// Lets the password come from its own source, such as an environment
    /// variable, instead of a URL in the config file.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared statement,
        // so we split the schema and execute each statement separately.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AdminMarkerRepo for PostgresStore {
    async fn admin_token_marker(&self) -> MetadataResult<Option<Uuid>> {
        // None: no row. Some(None): the marker is NULL.
        let value: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT admin_token_id FROM admin_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.flatten())
    }

    async fn set_admin_token_marker(&self, token_id: Uuid) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_state (id, admin_token_id)
            VALUES (1, $1)
            ON CONFLICT(id) DO UPDATE
            SET admin_token_id = EXCLUDED.admin_token_id
            "#,
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Chunk count of a file when it is in the catalog.
async fn complete_chunk_count(
    conn: &mut PgConnection,
    file_hash: &str,
) -> MetadataResult<Option<i64>> {
    let (registered, chunk_count): (i64, Option<i64>) =
        sqlx::query_as("SELECT COUNT(*), MAX(chunk_count) FROM chunks WHERE file_hash = $1")
            .bind(file_hash)
            .fetch_one(&mut *conn)
            .await?;
    Ok(chunk_count.filter(|&count| registered > 0 && registered == count))
}

async fn resolve_state(
    conn: &mut PgConnection,
    project_id: i64,
    at_commit_id: i64,
) -> MetadataResult<Vec<FileRevisionRow>> {
    let rows = sqlx::query_as::<_, FileRevisionRow>(
        r#"
        SELECT r.* FROM file_revisions r
        JOIN (
            SELECT path, MAX(revision_id) AS revision_id
            FROM file_revisions
            WHERE project_id = $1 AND commit_id <= $2
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
    conn: &mut PgConnection,
    project_id: i64,
    author_id: &str,
    comment: &str,
    file_count: i64,
    created_at: OffsetDateTime,
) -> MetadataResult<CommitRow> {
    let sequence_number: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM commits WHERE project_id = $1",
    )
    .bind(project_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query_as::<_, CommitRow>(
        r#"
        INSERT INTO commits (project_id, author_id, comment, file_count, sequence_number, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
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
    conn: &mut PgConnection,
    commit: &CommitRow,
    revision: &NewRevision,
    chunk_count: i64,
) -> MetadataResult<FileRevisionRow> {
    let row = sqlx::query_as::<_, FileRevisionRow>(
        r#"
        INSERT INTO file_revisions (project_id, path, commit_id, content_hash, change_kind, chunk_count)
        VALUES ($1, $2, $3, $4, $5, $6)
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
impl BlockRepo for PostgresStore {
    async fn put_block(&self, block: &BlockRow) -> MetadataResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO blocks (block_hash, storage_key, size, created_at)
            VALUES ($1, $2, $3, $4)
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
        let row = sqlx::query_as::<_, BlockRow>("SELECT * FROM blocks WHERE block_hash = $1")
            .bind(block_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete_block(&self, block_hash: &str) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM blocks WHERE block_hash = $1")
            .bind(block_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| MetadataError::classify(e, format!("block {block_hash}")))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ChunkRepo for PostgresStore {
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

        // Serializes registrations of one file until commit, so the catalog
        // check and the promotion below see a stable view.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(&chunk.file_hash)
            .execute(&mut *tx)
            .await?;

        let catalogued: Option<i64> =
            sqlx::query_scalar("SELECT chunk_count FROM chunks WHERE file_hash = $1 LIMIT 1")
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
                "SELECT block_hash FROM chunks WHERE file_hash = $1 AND chunk_index = $2",
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
            sqlx::query("DELETE FROM pending_chunks WHERE uploader_id = $1 AND file_hash = $2")
                .bind(uploader_id)
                .bind(&chunk.file_hash)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(InsertOutcome::AlreadyExists);
        }

        // A different chunk count restarts the uploader's staged set.
        sqlx::query(
            "DELETE FROM pending_chunks WHERE uploader_id = $1 AND file_hash = $2 AND chunk_count <> $3",
        )
        .bind(uploader_id)
        .bind(&chunk.file_hash)
        .bind(chunk.chunk_count)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO pending_chunks (uploader_id, file_hash, chunk_index, block_hash, block_size, chunk_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT(uploader_id, file_hash, chunk_index) DO UPDATE
            SET block_hash = EXCLUDED.block_hash,
                block_size = EXCLUDED.block_size,
                created_at = EXCLUDED.created_at
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
            WHERE uploader_id = $1 AND file_hash = $2
            ORDER BY chunk_index
            "#,
        )
        .bind(uploader_id)
        .bind(&chunk.file_hash)
        .fetch_all(&mut *tx)
        .await?;

        if staged.len() as i64 == chunk.chunk_count {
            sqlx::query("DELETE FROM pending_chunks WHERE uploader_id = $1 AND file_hash = $2")
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
                    VALUES ($1, $2, $3, $4, $5, $6)
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
            "SELECT * FROM chunks WHERE file_hash = $1 ORDER BY chunk_index",
        )
        .bind(file_hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_registered_chunks(&self, file_hash: &str) -> MetadataResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE file_hash = $1")
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
            "SELECT COUNT(*) FROM pending_chunks WHERE uploader_id = $1 AND file_hash = $2",
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
impl ProjectRepo for PostgresStore {
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
            VALUES ($1, $2, $3, $4)
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
            VALUES ($1, $2, $3, 0, 1, $4)
            "#,
        )
        .bind(project.project_id)
        .bind(created_by)
        .bind(INITIAL_COMMIT_MESSAGE)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO project_permissions (user_id, project_id, level, updated_at) VALUES ($1, $2, $3, $4)",
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
            sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE project_id = $1")
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
                WHERE pp.project_id = p.project_id AND pp.user_id = $1 AND pp.level >= 1
            ) OR EXISTS (
                SELECT 1 FROM team_permissions tp
                WHERE tp.team_id = p.team_id AND tp.user_id = $1 AND tp.level >= 1
            )
            ORDER BY p.project_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl CommitRepo for PostgresStore {
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
            "SELECT * FROM commits WHERE project_id = $1 AND commit_id = $2",
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
            "SELECT * FROM commits WHERE project_id = $1 AND sequence_number = $2",
        )
        .bind(project_id)
        .bind(sequence_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn latest_commit(&self, project_id: i64) -> MetadataResult<Option<CommitRow>> {
        let row = sqlx::query_as::<_, CommitRow>(
            "SELECT * FROM commits WHERE project_id = $1 ORDER BY sequence_number DESC LIMIT 1",
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
            WHERE project_id = $1
            ORDER BY sequence_number DESC
            LIMIT $2 OFFSET $3
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
            sqlx::query_scalar("SELECT COUNT(*) FROM commits WHERE project_id = $1")
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
            "SELECT * FROM file_revisions WHERE commit_id = $1 ORDER BY revision_id",
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
            WHERE project_id = $1 AND path = $2 AND commit_id <= $3
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
            "SELECT EXISTS(SELECT 1 FROM commits WHERE project_id = $1 AND commit_id = $2)",
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
            "SELECT commit_id FROM commits WHERE project_id = $1 ORDER BY sequence_number DESC LIMIT 1",
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
impl AccessRepo for PostgresStore {
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
                    WHERE user_id = $1 AND project_id = $2
                ), 0),
                COALESCE((
                    SELECT MAX(tp.level) FROM team_permissions tp
                    JOIN projects p ON p.team_id = tp.team_id
                    WHERE tp.user_id = $1 AND p.project_id = $2
                ), 0)
            "#,
        )
        .bind(user_id)
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(AccessLevel::from_code(project_level)
            .max(AccessLevel::from_team_level(AccessLevel::from_code(team_level))))
    }

    async fn team_access(&self, user_id: &str, team_id: &str) -> MetadataResult<AccessLevel> {
        let level: Option<i32> = sqlx::query_scalar(
            "SELECT level FROM team_permissions WHERE user_id = $1 AND team_id = $2",
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
            SELECT EXISTS(SELECT 1 FROM project_permissions WHERE user_id = $1 AND level >= $2)
                OR EXISTS(SELECT 1 FROM team_permissions WHERE user_id = $1 AND level >= $2)
            "#,
        )
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
            sqlx::query("DELETE FROM project_permissions WHERE user_id = $1 AND project_id = $2")
                .bind(user_id)
                .bind(project_id)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO project_permissions (user_id, project_id, level, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(user_id, project_id) DO UPDATE
            SET level = EXCLUDED.level, updated_at = EXCLUDED.updated_at
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
            sqlx::query("DELETE FROM team_permissions WHERE user_id = $1 AND team_id = $2")
                .bind(user_id)
                .bind(team_id)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO team_permissions (user_id, team_id, level, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(user_id, team_id) DO UPDATE
            SET level = EXCLUDED.level, updated_at = EXCLUDED.updated_at
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
impl TokenRepo for PostgresStore {
    async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (
                token_id, user_id, token_hash, is_admin, expires_at,
                revoked_at, created_at, last_used_at, description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
        sqlx::query("UPDATE tokens SET last_used_at = $1 WHERE token_id = $2")
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
            "UPDATE tokens SET revoked_at = COALESCE(revoked_at, $1) WHERE token_id = $2",
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
                    "SELECT * FROM tokens WHERE user_id = $1 ORDER BY created_at",
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
