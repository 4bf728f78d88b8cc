//! Response envelope shared by every JSON endpoint.
//!
//! ```json
//! {"response": "success", "body": ...}
//! {"response": "needs_blocks", "body": {"missing_hashes": [...]}}
//! {"response": "error", "error": {"code": ..., "message": ..., "retry": ...}}
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hangar_core::FileHash;
use hangar_engine::Retry;
use serde::Serialize;

/// Error details carried by an error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Whether and when the caller should retry.
    pub retry: Retry,
}

/// Content the server still needs before a commit can land.
#[derive(Debug, Serialize)]
pub struct MissingBlocks {
    pub missing_hashes: Vec<FileHash>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum Envelope<T> {
    Success { body: T },
    NeedsBlocks { body: MissingBlocks },
    Error { error: ErrorBody },
}

/// A successful response with a status code.
#[derive(Debug)]
pub struct ApiSuccess<T> {
    pub status: StatusCode,
    pub body: T,
}

impl<T> ApiSuccess<T> {
    pub fn ok(body: T) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn created(body: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            body,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> Response {
        (self.status, Json(Envelope::Success { body: self.body })).into_response()
    }
}

/// Response for a commit that could not land yet.
///
/// Not an error: the client uploads the listed content and resubmits.
pub fn needs_blocks(missing_hashes: Vec<FileHash>) -> Response {
    (
        StatusCode::OK,
        Json(Envelope::<()>::NeedsBlocks {
            body: MissingBlocks { missing_hashes },
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hangar_core::BlockHash;
    use serde_json::json;

    #[test]
    fn test_success_envelope() {
        let value = serde_json::to_value(Envelope::Success { body: json!({"a": 1}) }).unwrap();
        assert_eq!(value, json!({"response": "success", "body": {"a": 1}}));
    }

    #[test]
    fn test_error_envelope() {
        let value = serde_json::to_value(Envelope::<()>::Error {
            error: ErrorBody {
                code: "storage_unavailable".to_string(),
                message: "storage unavailable: disk".to_string(),
                retry: Retry::Later,
            },
        })
        .unwrap();
        assert_eq!(value["response"], "error");
        assert_eq!(value["error"]["code"], "storage_unavailable");
        assert_eq!(value["error"]["retry"], "later");
    }

    #[test]
    fn test_needs_blocks_envelope() {
        let hash = FileHash::from_block_hashes([&BlockHash::compute(b"x")]);
        let value = serde_json::to_value(Envelope::<()>::NeedsBlocks {
            body: MissingBlocks {
                missing_hashes: vec![hash],
            },
        })
        .unwrap();
        assert_eq!(value["response"], "needs_blocks");
        assert_eq!(value["body"]["missing_hashes"][0], hash.to_hex());
    }
}
