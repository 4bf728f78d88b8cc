//! Application state shared across handlers.

use hangar_core::config::AppConfig;
use hangar_engine::{Engine, EngineSettings};
use hangar_metadata::MetadataStore;
use hangar_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Revisioning operations over the two stores.
    pub engine: Engine,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let engine = Engine::new(
            metadata.clone(),
            storage.clone(),
            EngineSettings::from_config(&config.server),
        );
        Self {
            config: Arc::new(config),
            storage,
            metadata,
            engine,
        }
    }
}
