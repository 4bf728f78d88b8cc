use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use hangar_core::block::split_blocks;
use hangar_core::{
    AccessLevel, ChangeKind, CommitOutcome, CommitRequest, FileHash, Project, ProjectId,
    ProposedChange, UploadChunkRequest,
};
use hangar_engine::{Engine, EngineSettings};
use hangar_metadata::{MetadataStore, SqliteStore};
use hangar_storage::{
    ByteStream, FilesystemBackend, ObjectMeta, ObjectStore, PresignedUrl, StorageError,
    StorageResult, StreamingUpload, UrlSigner,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use time::OffsetDateTime;

pub const TEAM: &str = "team-1";
pub const OWNER: &str = "alice";
pub const READER: &str = "bob";
pub const OUTSIDER: &str = "mallory";
/// A writer on another team, with no access to test projects.
pub const WRITER: &str = "carol";

/// Block size used by tests so small payloads span several blocks.
pub const TEST_BLOCK_SIZE: usize = 64;

/// Generate deterministic test data using a seeded pseudo-random generator.
pub fn seeded_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    let mut state = seed;
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }
    data
}

/// A chunk body delivered in two frames.
pub fn body(data: &[u8]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Unpin {
    let mid = data.len() / 2;
    stream::iter(vec![
        Ok(Bytes::copy_from_slice(&data[..mid])),
        Ok(Bytes::copy_from_slice(&data[mid..])),
    ])
}

pub fn change(path: &str, content_hash: &FileHash, change_kind: ChangeKind) -> ProposedChange {
    ProposedChange {
        path: path.to_string(),
        content_hash: content_hash.clone(),
        change_kind,
    }
}

/// An engine over a temp-dir SQLite catalog and filesystem store.
pub struct TestEnv {
    pub engine: Engine,
    pub metadata: Arc<dyn MetadataStore>,
    _dir: TempDir,
}

pub async fn test_env() -> TestEnv {
    test_env_with_storage(|backend| Arc::new(backend) as Arc<dyn ObjectStore>).await
}

/// Like [`test_env`], letting the caller wrap the filesystem backend.
pub async fn test_env_with_storage<F>(wrap: F) -> TestEnv
where
    F: FnOnce(FilesystemBackend) -> Arc<dyn ObjectStore>,
{
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let metadata: Arc<dyn MetadataStore> = Arc::new(
        SqliteStore::new(dir.path().join("metadata.db"))
            .await
            .expect("Failed to open sqlite store"),
    );
    let backend = FilesystemBackend::new(
        dir.path().join("blocks"),
        UrlSigner::new(b"engine-test-signing-key".to_vec(), "http://localhost:8080"),
    )
    .await
    .expect("Failed to create filesystem backend");

    let now = OffsetDateTime::now_utc();
    metadata
        .set_team_permission(OWNER, TEAM, AccessLevel::Write, now)
        .await
        .expect("Failed to grant team access");

    let settings = EngineSettings {
        max_block_size: TEST_BLOCK_SIZE as u64,
        ..EngineSettings::default()
    };
    TestEnv {
        engine: Engine::new(metadata.clone(), wrap(backend), settings),
        metadata,
        _dir: dir,
    }
}

impl TestEnv {
    /// Create a project owned by [`OWNER`] that [`READER`] can read.
    pub async fn project(&self, title: &str) -> Project {
        let project = self
            .engine
            .create_project(OWNER, TEAM, title)
            .await
            .expect("Failed to create project");
        self.metadata
            .set_project_permission(
                READER,
                project.project_id,
                AccessLevel::Read,
                OffsetDateTime::now_utc(),
            )
            .await
            .expect("Failed to grant read access");
        project
    }

    /// Upload every block of `data` as [`OWNER`] and return the file hash.
    pub async fn upload_file(&self, data: &[u8]) -> FileHash {
        let blocks = split_blocks(data, TEST_BLOCK_SIZE);
        let file_hash = FileHash::from_block_hashes(blocks.iter().map(|(hash, _)| hash));
        for (index, (block_hash, bytes)) in blocks.iter().enumerate() {
            let request = UploadChunkRequest {
                uploader_id: OWNER.to_string(),
                file_hash: file_hash.clone(),
                chunk_index: index as u32,
                total_chunks: blocks.len() as u32,
                block_hash: block_hash.clone(),
                size: bytes.len() as u64,
            };
            self.engine
                .upload_chunk(&request, body(bytes))
                .await
                .expect("Failed to upload chunk");
        }
        file_hash
    }

    /// Commit and expect the commit to land.
    pub async fn commit(
        &self,
        project_id: ProjectId,
        message: &str,
        changes: Vec<ProposedChange>,
    ) -> i64 {
        let outcome = self
            .engine
            .commit(&CommitRequest {
                project_id,
                author_id: OWNER.to_string(),
                message: message.to_string(),
                changes,
            })
            .await
            .expect("Failed to commit");
        match outcome {
            CommitOutcome::Committed { commit_id, .. } => commit_id,
            CommitOutcome::NeedsBlocks { missing_hashes } => {
                panic!("commit unexpectedly needs blocks: {missing_hashes:?}")
            }
        }
    }
}

/// Object store wrapper whose writes can be switched off.
pub struct FlakyStore {
    inner: FilesystemBackend,
    pub writes_fail: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: FilesystemBackend) -> Self {
        Self {
            inner,
            writes_fail: AtomicBool::new(false),
        }
    }

    fn check_writes(&self) -> StorageResult<()> {
        if self.writes_fail.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("disk offline")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.check_writes()?;
        self.inner.put(key, data).await
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        self.check_writes()?;
        self.inner.put_stream(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> StorageResult<PresignedUrl> {
        self.inner.presign_get(key, ttl).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}
