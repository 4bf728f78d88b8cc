//! End-to-end tests for upload, commit, state, restore and download.

mod common;

use bytes::Bytes;
use common::fixtures::{OUTSIDER, OWNER, READER, TEST_BLOCK_SIZE, WRITER};
use common::{FlakyStore, body, change, seeded_bytes, test_env, test_env_with_storage};
use futures::stream;
use hangar_core::block::split_blocks;
use hangar_core::{
    AccessLevel, BlockHash, ChangeKind, CommitBoundary, CommitOutcome, CommitRequest, FileHash,
    INITIAL_COMMIT_MESSAGE, UploadChunkRequest, UploadOutcome,
};
use hangar_engine::{EngineError, Retry};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use time::OffsetDateTime;

fn single_block_request(data: &[u8]) -> UploadChunkRequest {
    let block_hash = BlockHash::compute(data);
    UploadChunkRequest {
        uploader_id: OWNER.to_string(),
        file_hash: FileHash::from_block_hashes([&block_hash]),
        chunk_index: 0,
        total_chunks: 1,
        block_hash,
        size: data.len() as u64,
    }
}

#[tokio::test]
async fn test_duplicate_block_skips_body() {
    let env = test_env().await;
    let data = seeded_bytes(1, 40);
    let request = single_block_request(&data);

    let first = env.engine.upload_chunk(&request, body(&data)).await.unwrap();
    assert_eq!(first, UploadOutcome::Uploaded);

    // A body that fails when read proves the duplicate path never reads it.
    let broken = stream::iter(vec![Err::<Bytes, _>(std::io::Error::other("not read"))]);
    let second = env.engine.upload_chunk(&request, broken).await.unwrap();
    assert_eq!(second, UploadOutcome::DuplicateAccepted);

    let key = request.block_hash.to_object_key();
    assert!(env.engine.storage().exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_same_block_in_two_files() {
    let env = test_env().await;
    let shared = seeded_bytes(2, TEST_BLOCK_SIZE);
    let tail_a = seeded_bytes(3, 10);
    let tail_b = seeded_bytes(4, 10);

    let a = env.upload_file(&[shared.clone(), tail_a].concat()).await;
    let b = env.upload_file(&[shared.clone(), tail_b].concat()).await;
    assert_ne!(a, b);

    let chunks_a = env.metadata.list_chunks(&a.to_hex()).await.unwrap();
    let chunks_b = env.metadata.list_chunks(&b.to_hex()).await.unwrap();
    assert_eq!(chunks_a.len(), 2);
    assert_eq!(chunks_a[0].block_hash, chunks_b[0].block_hash);
    assert_ne!(chunks_a[1].block_hash, chunks_b[1].block_hash);
}

#[tokio::test]
async fn test_concurrent_uploads_of_same_block() {
    let env = test_env().await;
    let data = seeded_bytes(30, 48);
    let request = single_block_request(&data);

    let (first, second) = tokio::join!(
        env.engine.upload_chunk(&request, body(&data)),
        env.engine.upload_chunk(&request, body(&data)),
    );
    let outcomes = [first.unwrap(), second.unwrap()];
    assert!(outcomes.contains(&UploadOutcome::Uploaded), "{outcomes:?}");

    let block_hash = request.block_hash.to_hex();
    let block = env.metadata.get_block(&block_hash).await.unwrap().unwrap();
    assert_eq!(block.size, 48);
    let chunks = env
        .metadata
        .list_chunks(&request.file_hash.to_hex())
        .await
        .unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].block_hash, block_hash);

    let key = request.block_hash.to_object_key();
    let stored = env.engine.storage().get(&key).await.unwrap();
    assert_eq!(stored.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_forged_chunk_cannot_claim_file_hash() {
    let env = test_env().await;
    let project = env.project("Gearbox").await;
    env.metadata
        .set_team_permission(
            WRITER,
            "team-2",
            AccessLevel::Write,
            OffsetDateTime::now_utc(),
        )
        .await
        .unwrap();

    let real = seeded_bytes(31, 40);
    let request = single_block_request(&real);

    // Another writer files unrelated bytes under the same file hash first.
    let garbage = seeded_bytes(32, 40);
    let forged = UploadChunkRequest {
        uploader_id: WRITER.to_string(),
        block_hash: BlockHash::compute(&garbage),
        ..request.clone()
    };
    let err = env
        .engine
        .upload_chunk(&forged, body(&garbage))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedRequest(_)), "{err:?}");

    let outcome = env.engine.upload_chunk(&request, body(&real)).await.unwrap();
    assert_eq!(outcome, UploadOutcome::Uploaded);
    env.commit(
        project.project_id,
        "gearbox",
        vec![change("gearbox.sldprt", &request.file_hash, ChangeKind::Add)],
    )
    .await;

    let plan = env
        .engine
        .resolve_download(
            READER,
            project.project_id,
            "gearbox.sldprt",
            CommitBoundary::Latest,
        )
        .await
        .unwrap();
    assert_eq!(plan.chunks.len(), 1);
    assert_eq!(plan.chunks[0].block_hash, request.block_hash);
}

#[tokio::test]
async fn test_hash_mismatch_rejected() {
    let env = test_env().await;
    let declared = seeded_bytes(5, 32);
    let actual = seeded_bytes(6, 32);
    let request = single_block_request(&declared);

    let err = env
        .engine
        .upload_chunk(&request, body(&actual))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ContentMismatch { .. }), "{err:?}");
    assert_eq!(err.retry(), Retry::FixInput);

    let key = request.block_hash.to_object_key();
    assert!(!env.engine.storage().exists(&key).await.unwrap());
    assert!(
        env.metadata
            .get_block(&request.block_hash.to_hex())
            .await
            .unwrap()
            .is_none()
    );

    // The correct bytes are still accepted afterwards.
    let outcome = env
        .engine
        .upload_chunk(&request, body(&declared))
        .await
        .unwrap();
    assert_eq!(outcome, UploadOutcome::Uploaded);
}

#[tokio::test]
async fn test_body_longer_than_declared() {
    let env = test_env().await;
    let data = seeded_bytes(7, 32);
    let mut request = single_block_request(&data);
    request.size = 16;

    let err = env
        .engine
        .upload_chunk(&request, body(&data))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedRequest(_)), "{err:?}");
}

#[tokio::test]
async fn test_block_over_size_limit() {
    let env = test_env().await;
    let data = seeded_bytes(8, TEST_BLOCK_SIZE + 1);
    let request = single_block_request(&data);

    let err = env
        .engine
        .upload_chunk(&request, body(&data))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedRequest(_)), "{err:?}");
}

#[tokio::test]
async fn test_upload_requires_write_somewhere() {
    let env = test_env().await;
    let data = seeded_bytes(9, 16);
    let mut request = single_block_request(&data);
    request.uploader_id = OUTSIDER.to_string();

    let err = env
        .engine
        .upload_chunk(&request, body(&data))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientPermission(_)));
}

#[tokio::test]
async fn test_storage_outage_is_retryable() {
    let mut flaky = None;
    let env = test_env_with_storage(|backend| {
        let store = Arc::new(FlakyStore::new(backend));
        flaky = Some(store.clone());
        store
    })
    .await;
    let flaky = flaky.unwrap();

    let data = seeded_bytes(10, 48);
    let request = single_block_request(&data);

    flaky.writes_fail.store(true, Ordering::SeqCst);
    let err = env
        .engine
        .upload_chunk(&request, body(&data))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StorageUnavailable(_)), "{err:?}");
    assert_eq!(err.retry(), Retry::Later);

    flaky.writes_fail.store(false, Ordering::SeqCst);
    let outcome = env
        .engine
        .upload_chunk(&request, body(&data))
        .await
        .unwrap();
    assert_eq!(outcome, UploadOutcome::Uploaded);
}

#[tokio::test]
async fn test_new_project_has_initial_commit() {
    let env = test_env().await;
    let project = env.project("Gearbox").await;

    let history = env
        .engine
        .history(OWNER, project.project_id, 0)
        .await
        .unwrap();
    assert_eq!(history.total_count, 1);
    assert_eq!(history.commits[0].comment, INITIAL_COMMIT_MESSAGE);
    assert_eq!(history.commits[0].sequence_number, 1);

    let state = env
        .engine
        .current_state(READER, project.project_id)
        .await
        .unwrap();
    assert!(state.files.is_empty());
}

#[tokio::test]
async fn test_commit_reports_missing_content() {
    let env = test_env().await;
    let project = env.project("Bracket").await;

    let present = env.upload_file(&seeded_bytes(11, 100)).await;

    // Only the first of two chunks of this file is uploaded.
    let partial_data = seeded_bytes(12, 100);
    let blocks = split_blocks(&partial_data, TEST_BLOCK_SIZE);
    let partial = FileHash::from_block_hashes(blocks.iter().map(|(hash, _)| hash));
    let request = UploadChunkRequest {
        uploader_id: OWNER.to_string(),
        file_hash: partial.clone(),
        chunk_index: 0,
        total_chunks: blocks.len() as u32,
        block_hash: blocks[0].0.clone(),
        size: blocks[0].1.len() as u64,
    };
    env.engine
        .upload_chunk(&request, body(blocks[0].1))
        .await
        .unwrap();

    let never_uploaded = FileHash::from_block_hashes([&BlockHash::compute(b"absent")]);

    let outcome = env
        .engine
        .commit(&CommitRequest {
            project_id: project.project_id,
            author_id: OWNER.to_string(),
            message: "add parts".to_string(),
            changes: vec![
                change("a.sldprt", &present, ChangeKind::Add),
                change("b.sldprt", &partial, ChangeKind::Add),
                change("c.sldprt", &never_uploaded, ChangeKind::Add),
            ],
        })
        .await
        .unwrap();

    match outcome {
        CommitOutcome::NeedsBlocks { missing_hashes } => {
            assert_eq!(missing_hashes, vec![partial, never_uploaded]);
        }
        other => panic!("expected NeedsBlocks, got {other:?}"),
    }

    let history = env
        .engine
        .history(OWNER, project.project_id, 0)
        .await
        .unwrap();
    assert_eq!(history.total_count, 1);
}

#[tokio::test]
async fn test_commit_without_changes() {
    let env = test_env().await;
    let project = env.project("Sketches").await;
    let pid = project.project_id;

    let commit_id = env.commit(pid, "checkpoint", vec![]).await;

    let history = env.engine.history(OWNER, pid, 0).await.unwrap();
    assert_eq!(history.total_count, 2);
    assert_eq!(history.commits[0].commit_id, commit_id);
    assert_eq!(history.commits[0].sequence_number, 2);
    assert_eq!(history.commits[0].file_count, 0);
}

#[tokio::test]
async fn test_commit_permissions() {
    let env = test_env().await;
    let project = env.project("Housing").await;
    let hash = env.upload_file(&seeded_bytes(13, 20)).await;

    for user in [READER, OUTSIDER] {
        let err = env
            .engine
            .commit(&CommitRequest {
                project_id: project.project_id,
                author_id: user.to_string(),
                message: "sneaky".to_string(),
                changes: vec![change("a.sldprt", &hash, ChangeKind::Add)],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientPermission(_)));
    }

    let err = env
        .engine
        .current_state(OUTSIDER, project.project_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientPermission(_)));
}

#[tokio::test]
async fn test_revision_scenario() {
    let env = test_env().await;
    let project = env.project("Pump assembly").await;
    let pid = project.project_id;

    let housing_v1 = env.upload_file(&seeded_bytes(20, 150)).await;
    let impeller = env.upload_file(&seeded_bytes(21, 64)).await;
    let c1 = env
        .commit(
            pid,
            "first parts",
            vec![
                change("housing.sldprt", &housing_v1, ChangeKind::Add),
                change("impeller.sldprt", &impeller, ChangeKind::Add),
            ],
        )
        .await;

    let housing_v2 = env.upload_file(&seeded_bytes(22, 170)).await;
    let c2 = env
        .commit(
            pid,
            "thicker wall",
            vec![change("housing.sldprt", &housing_v2, ChangeKind::Modify)],
        )
        .await;

    let c3 = env
        .commit(
            pid,
            "drop impeller",
            vec![change("impeller.sldprt", &impeller, ChangeKind::Delete)],
        )
        .await;

    // Newest revision at or before the boundary wins; deletes hide paths.
    let at_c1 = env
        .engine
        .state_at(READER, pid, CommitBoundary::Id(c1))
        .await
        .unwrap();
    let paths: Vec<_> = at_c1.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["housing.sldprt", "impeller.sldprt"]);
    assert_eq!(at_c1.get("housing.sldprt").unwrap().content_hash, housing_v1);

    let latest = env.engine.current_state(READER, pid).await.unwrap();
    assert_eq!(latest.commit_id, c3);
    assert_eq!(latest.sequence_number, 4);
    assert_eq!(latest.files.len(), 1);
    assert_eq!(latest.files[0].content_hash, housing_v2);
    assert_eq!(latest.files[0].commit_id, c2);

    let by_sequence = env
        .engine
        .state_at(READER, pid, CommitBoundary::Sequence(3))
        .await
        .unwrap();
    assert_eq!(by_sequence.commit_id, c2);
    assert_eq!(by_sequence.files.len(), 2);

    let diff = env
        .engine
        .diff(
            READER,
            pid,
            CommitBoundary::Id(c2),
            CommitBoundary::Id(c3),
        )
        .await
        .unwrap();
    assert_eq!(diff.unchanged.len(), 1);
    assert_eq!(diff.unchanged[0].path, "housing.sldprt");
    assert_eq!(diff.changed.len(), 1);
    assert_eq!(diff.changed[0].path, "impeller.sldprt");
    assert!(diff.changed[0].to.is_none());

    // Restore needs manage access.
    let err = env.engine.restore(READER, pid, c1).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientPermission(_)));

    let restored = env.engine.restore(OWNER, pid, c1).await.unwrap();
    assert_eq!(restored.sequence_number, 5);
    assert_eq!(restored.comment, "Restore to commit #2");
    assert_eq!(restored.file_count, 2);

    let after = env.engine.current_state(READER, pid).await.unwrap();
    let hashes: Vec<_> = after
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.content_hash.clone()))
        .collect();
    assert_eq!(
        hashes,
        vec![
            ("housing.sldprt", housing_v1.clone()),
            ("impeller.sldprt", impeller.clone()),
        ]
    );

    let detail = env
        .engine
        .commit_detail(READER, pid, restored.commit_id)
        .await
        .unwrap();
    assert_eq!(detail.revisions.len(), 2);
    assert_eq!(detail.commit.commit_id, restored.commit_id);

    // History never shrinks.
    let history = env.engine.history(READER, pid, 0).await.unwrap();
    assert_eq!(history.total_count, 5);
    assert_eq!(history.commits[0].commit_id, restored.commit_id);
}

#[tokio::test]
async fn test_restore_deletes_newer_paths() {
    let env = test_env().await;
    let project = env.project("Frame").await;
    let pid = project.project_id;

    let rail = env.upload_file(&seeded_bytes(30, 90)).await;
    let c1 = env
        .commit(pid, "rail", vec![change("rail.sldprt", &rail, ChangeKind::Add)])
        .await;
    let plate = env.upload_file(&seeded_bytes(31, 30)).await;
    env.commit(
        pid,
        "plate",
        vec![change("plate.sldprt", &plate, ChangeKind::Add)],
    )
    .await;

    let restored = env.engine.restore(OWNER, pid, c1).await.unwrap();
    assert_eq!(restored.file_count, 1);

    let state = env.engine.current_state(OWNER, pid).await.unwrap();
    let paths: Vec<_> = state.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["rail.sldprt"]);
    // Unchanged paths keep their original revision.
    assert_eq!(state.files[0].commit_id, c1);
}

#[tokio::test]
async fn test_restore_unknown_commit() {
    let env = test_env().await;
    let project = env.project("Crank").await;

    let err = env
        .engine
        .restore(OWNER, project.project_id, 9_999)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ContentNotFound(_)), "{err:?}");
}

#[tokio::test]
async fn test_history_pages() {
    let env = test_env().await;
    let project = env.project("Valve").await;
    let pid = project.project_id;
    let page_size = env.engine.settings().history_page_size as usize;

    let hash = env.upload_file(&seeded_bytes(40, 10)).await;
    env.commit(pid, "v1", vec![change("valve.sldprt", &hash, ChangeKind::Add)])
        .await;
    for i in 0..page_size {
        let next = env.upload_file(&seeded_bytes(41 + i as u64, 10)).await;
        env.commit(
            pid,
            &format!("rev {i}"),
            vec![change("valve.sldprt", &next, ChangeKind::Modify)],
        )
        .await;
    }

    let total = page_size as i64 + 2;
    let first = env.engine.history(READER, pid, 0).await.unwrap();
    assert_eq!(first.total_count, total);
    assert_eq!(first.commits.len(), page_size);
    assert_eq!(first.commits[0].sequence_number, total);
    assert!(
        first
            .commits
            .windows(2)
            .all(|w| w[0].sequence_number > w[1].sequence_number)
    );

    let second = env
        .engine
        .history(READER, pid, page_size as i64)
        .await
        .unwrap();
    assert_eq!(second.commits.len(), 2);
    assert_eq!(second.commits[1].sequence_number, 1);

    let err = env.engine.history(READER, pid, -1).await.unwrap_err();
    assert!(matches!(err, EngineError::MalformedRequest(_)));
}

#[tokio::test]
async fn test_download_plan() {
    let env = test_env().await;
    let project = env.project("Shaft").await;
    let pid = project.project_id;

    let data = seeded_bytes(50, 200);
    let hash = env.upload_file(&data).await;
    let c1 = env
        .commit(pid, "shaft", vec![change("shaft.sldprt", &hash, ChangeKind::Add)])
        .await;
    env.commit(
        pid,
        "remove shaft",
        vec![change("shaft.sldprt", &hash, ChangeKind::Delete)],
    )
    .await;

    let before = OffsetDateTime::now_utc();
    let plan = env
        .engine
        .resolve_download(READER, pid, "shaft.sldprt", CommitBoundary::Id(c1))
        .await
        .unwrap();
    assert_eq!(plan.content_hash, hash);
    assert_eq!(plan.commit_id, c1);
    assert_eq!(plan.total_size(), 200);

    let expected = split_blocks(&data, TEST_BLOCK_SIZE);
    assert_eq!(plan.chunks.len(), expected.len());
    for (chunk, (block_hash, bytes)) in plan.chunks.iter().zip(&expected) {
        assert_eq!(&chunk.block_hash, block_hash);
        assert_eq!(chunk.size, bytes.len() as i64);
        assert!(chunk.url.contains(&block_hash.to_hex()));
    }

    let ttl = env.engine.settings().download_url_ttl;
    assert!(plan.expires_at >= before + ttl);
    assert!(plan.expires_at <= OffsetDateTime::now_utc() + ttl);

    let err = env
        .engine
        .resolve_download(READER, pid, "shaft.sldprt", CommitBoundary::Latest)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ContentNotFound(_)));

    let err = env
        .engine
        .resolve_download(OUTSIDER, pid, "shaft.sldprt", CommitBoundary::Id(c1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientPermission(_)));
}

#[tokio::test]
async fn test_empty_file() {
    let env = test_env().await;
    let project = env.project("Notes").await;
    let pid = project.project_id;

    let hash = env.upload_file(&[]).await;
    env.commit(pid, "empty", vec![change("notes.txt", &hash, ChangeKind::Add)])
        .await;

    let plan = env
        .engine
        .resolve_download(READER, pid, "notes.txt", CommitBoundary::Latest)
        .await
        .unwrap();
    assert_eq!(plan.chunks.len(), 1);
    assert_eq!(plan.chunks[0].size, 0);
}
