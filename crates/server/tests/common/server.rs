//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hangar_core::config::{AdminConfig, AppConfig, MetadataConfig, ServerConfig, StorageConfig};
use hangar_core::{AccessLevel, ProjectId};
use hangar_metadata::models::TokenRow;
use hangar_metadata::{MetadataStore, SqliteStore};
use hangar_server::bootstrap::ensure_admin_token;
use hangar_server::{AppState, create_router};
use hangar_storage::{FilesystemBackend, ObjectStore, UrlSigner};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

/// Raw secret of the bootstrap admin token in test servers.
#[allow(dead_code)]
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Block size configured on test servers.
#[allow(dead_code)]
pub const TEST_BLOCK_SIZE: usize = 256;

/// Base URL used to sign block URLs in tests.
pub const TEST_BASE_URL: &str = "http://hangar.test";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let signing_key = "server-test-signing-key";
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(
                &storage_path,
                UrlSigner::new(signing_key.as_bytes().to_vec(), TEST_BASE_URL),
            )
            .await
            .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig {
            server: ServerConfig {
                max_block_size: TEST_BLOCK_SIZE as u64,
                ..Default::default()
            },
            storage: StorageConfig::Filesystem {
                path: storage_path,
                public_base_url: TEST_BASE_URL.to_string(),
                url_signing_key: Some(signing_key.to_string()),
            },
            metadata: MetadataConfig::Sqlite { path: db_path },
            admin: AdminConfig::for_testing(),
        };
        modifier(&mut config);

        ensure_admin_token(metadata.as_ref(), &config.admin)
            .await
            .expect("Failed to create admin token");

        let state = AppState::new(config, storage, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Create a user token directly in the store and return its secret.
    pub async fn user_token(&self, user_id: &str) -> String {
        let raw_token = format!("test-token-{}", Uuid::new_v4());
        let token = TokenRow {
            token_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            token_hash: super::fixtures::sha256_hash(raw_token.as_bytes()),
            is_admin: false,
            expires_at: None,
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
            last_used_at: None,
            description: Some("Test Token".to_string()),
        };
        self.metadata()
            .create_token(&token)
            .await
            .expect("Failed to create token");
        raw_token
    }

    pub async fn grant_team(&self, user_id: &str, team_id: &str, level: AccessLevel) {
        self.metadata()
            .set_team_permission(user_id, team_id, level, OffsetDateTime::now_utc())
            .await
            .expect("Failed to grant team permission");
    }

    pub async fn grant_project(&self, user_id: &str, project_id: ProjectId, level: AccessLevel) {
        self.metadata()
            .set_project_permission(user_id, project_id, level, OffsetDateTime::now_utc())
            .await
            .expect("Failed to grant project permission");
    }

    /// Send a JSON request and return the status and parsed body.
    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        auth_token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = auth_token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }

        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).unwrap()).await
    }

    /// Upload raw block bytes.
    pub async fn put_block(
        &self,
        uri: &str,
        data: Vec<u8>,
        auth_token: &str,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("PUT")
            .uri(uri)
            .header("Authorization", format!("Bearer {}", auth_token))
            .header("Content-Type", "application/octet-stream")
            .header("Content-Length", data.len())
            .body(Body::from(data))
            .unwrap();
        self.send(request).await
    }

    /// Send a request and return status plus raw body bytes.
    pub async fn raw(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body_bytes.to_vec())
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body_bytes) = self.raw(request).await;
        let json: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
