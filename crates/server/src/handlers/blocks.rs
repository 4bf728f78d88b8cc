//! Block upload and signed block retrieval.

use crate::auth::{get_trace_id, require_auth};
use crate::envelope::ApiSuccess;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Path, Query};
use crate::metrics::{
    BLOCK_HASH_MISMATCHES, BLOCK_UPLOAD_DURATION, BLOCKS_DEDUPLICATED, BLOCKS_UPLOADED,
    BYTES_DEDUPLICATED, BYTES_UPLOADED, record_upload_error,
};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use hangar_core::{BlockHash, FileHash, UploadChunkRequest, UploadOutcome};
use hangar_engine::EngineError;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Positional metadata for an uploaded block.
#[derive(Debug, Deserialize)]
pub struct UploadBlockQuery {
    pub file_hash: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
}

#[derive(Debug, Serialize)]
pub struct UploadBlockResponse {
    pub outcome: UploadOutcome,
}

/// PUT /v1/blocks/{block_hash}?file_hash=&chunk_index=&total_chunks=
///
/// The raw body is the block. `Content-Length` is required and must equal
/// the block size.
pub async fn upload_block(
    State(state): State<AppState>,
    Path(block_hash): Path<String>,
    Query(query): Query<UploadBlockQuery>,
    req: Request,
) -> ApiResult<ApiSuccess<UploadBlockResponse>> {
    let start_time = Instant::now();
    let trace_id = get_trace_id(&req).cloned().unwrap_or_default();
    let uploader_id = require_auth(&req)?.user_id.clone();

    let block_hash = BlockHash::from_hex(&block_hash)
        .map_err(|e| ApiError::BadRequest(format!("invalid block hash: {e}")))?;
    let file_hash = FileHash::from_hex(&query.file_hash)
        .map_err(|e| ApiError::BadRequest(format!("invalid file hash: {e}")))?;
    let size = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| ApiError::BadRequest("content-length header required".to_string()))?;

    let request = UploadChunkRequest {
        uploader_id,
        file_hash,
        chunk_index: query.chunk_index,
        total_chunks: query.total_chunks,
        block_hash,
        size,
    };

    let body = req.into_body().into_data_stream();
    let outcome = match state.engine.upload_chunk(&request, body).await {
        Ok(outcome) => outcome,
        Err(err) => {
            if matches!(err, EngineError::ContentMismatch { .. }) {
                BLOCK_HASH_MISMATCHES.inc();
            }
            record_upload_error(err.code());
            tracing::debug!(trace_id = %trace_id, error = %err, "block upload rejected");
            return Err(err.into());
        }
    };

    match outcome {
        UploadOutcome::Uploaded => {
            BLOCKS_UPLOADED.inc();
            BYTES_UPLOADED.inc_by(size);
        }
        UploadOutcome::DuplicateAccepted => {
            BLOCKS_DEDUPLICATED.inc();
            BYTES_DEDUPLICATED.inc_by(size);
        }
    }
    BLOCK_UPLOAD_DURATION.observe(start_time.elapsed().as_secs_f64());

    let response = UploadBlockResponse { outcome };
    Ok(match outcome {
        UploadOutcome::Uploaded => ApiSuccess::created(response),
        UploadOutcome::DuplicateAccepted => ApiSuccess::ok(response),
    })
}

/// Signature parameters of a presigned block URL.
#[derive(Debug, Deserialize)]
pub struct SignedUrlQuery {
    pub expires: i64,
    pub signature: String,
}

/// GET /v1/blobs/{*key}?expires=&signature=
///
/// Serves objects of the filesystem backend to holders of a presigned URL.
/// No bearer token is needed.
pub async fn get_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedUrlQuery>,
) -> ApiResult<Response> {
    state
        .storage
        .verify_presigned(&key, query.expires, &query.signature)?;

    let meta = state.storage.head(&key).await?;
    let stream = state.storage.get_stream(&key).await?;

    let mut response = (StatusCode::OK, Body::from_stream(stream)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(meta.size));
    Ok(response)
}
