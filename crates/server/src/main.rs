//! hangar server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use hangar_core::config::AppConfig;
use hangar_server::bootstrap::ensure_admin_token;
use hangar_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// hangar - file revisioning backend for engineering documents
#[derive(Parser, Debug)]
#[command(name = "hangard")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "HANGAR_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Merge the optional config file with `HANGAR_` environment variables.
fn load_config(config_path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    let has_config_file = std::path::Path::new(config_path).exists();

    if has_config_file {
        tracing::info!(config_path, "loading configuration from file");
        figment = figment.merge(Toml::file(config_path));
    } else {
        tracing::debug!("no config file found at {config_path}");
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("HANGAR_") && key != "HANGAR_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: hangard --config /path/to/config.toml\n  \
             2. Environment variables: HANGAR_SERVER__BIND=0.0.0.0:8080 \
             HANGAR_ADMIN__TOKEN_HASH=sha256:YOUR_TOKEN_HASH_HERE hangard\n\n\
             Set HANGAR_CONFIG to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("HANGAR_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("hangar v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    hangar_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = hangar_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    // Fail at startup rather than report healthy with unreachable storage.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "storage backend initialized");

    let metadata = hangar_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("metadata store initialized");

    ensure_admin_token(metadata.as_ref(), &config.admin).await?;

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, storage, metadata);
    let app = create_router(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "0.0.0.0:9000"
history_page_size = 20

[storage]
type = "filesystem"
path = "/var/lib/hangar/blocks"

[metadata]
type = "sqlite"
path = "/var/lib/hangar/metadata.db"

[admin]
token_hash = "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.history_page_size, 20);
        assert_eq!(config.server.download_url_ttl_secs, 172_800);
        assert_eq!(config.admin.user_id, "admin");
    }

    #[test]
    fn load_config_rejects_invalid_values() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[server]
download_url_ttl_secs = 0

[admin]
token_hash = "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
"#,
        )
        .unwrap();

        assert!(load_config(path.to_str().unwrap()).is_err());
    }
}
