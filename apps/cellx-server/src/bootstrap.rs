use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use cellx_core::{Config, Dataset, InMemoryDataset};
use utoipa::OpenApi;

use crate::{access_log, app_state::AppState, router::build_router};

/// File written next to the OpenAPI document on export.
const CONFIG_SCHEMA_FILE: &str = "cellx-config.schema.json";
const DEFAULT_CONCURRENCY: usize = 1024;

pub(crate) struct BootstrapOutput {
    pub router: axum::Router<AppState>,
    pub state: AppState,
}

/// Load the dataset named by the configuration and assemble the router.
pub(crate) fn build(config: Config) -> anyhow::Result<BootstrapOutput> {
    let state = build_state(config)?;
    let (router, endpoints) = build_router();
    tracing::info!(
        dataset = %state.dataset().name(),
        routes = endpoints.len(),
        "router ready"
    );
    for endpoint in &endpoints {
        tracing::debug!(%endpoint, "route registered");
    }
    Ok(BootstrapOutput { router, state })
}

pub(crate) fn build_state(config: Config) -> anyhow::Result<AppState> {
    let path = config
        .dataset
        .path
        .clone()
        .context("no dataset configured; set [dataset].path or CELLX_DATASET")?;
    let name = config.dataset_name();
    let dataset = InMemoryDataset::load_dir(name.clone(), Path::new(&path))
        .with_context(|| format!("failed to load dataset from {path}"))?;
    let (n_obs, n_var) = dataset.shape();
    tracing::info!(dataset = %name, path = %path, n_obs, n_var, "dataset loaded");
    std::fs::create_dir_all(&config.storage.root)
        .with_context(|| format!("failed to create storage root {}", config.storage.root))?;
    Ok(AppState::builder(config, Arc::new(dataset)).build())
}

pub(crate) fn attach_http_layers(
    router: axum::Router<()>,
    concurrency_limit: usize,
) -> axum::Router<()> {
    use tower::limit::ConcurrencyLimitLayer;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    router
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(concurrency_limit))
}

pub(crate) fn attach_global_layers(router: axum::Router<()>) -> axum::Router<()> {
    router.layer(axum::middleware::from_fn(access_log::access_log_mw))
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpConfigError {
    #[error("invalid CELLX_HTTP_MAX_CONC: {0}")]
    InvalidConcurrency(String),
    #[error("invalid CELLX_PORT: {0}")]
    InvalidPort(String),
    #[error("invalid CELLX_BIND: {0}")]
    InvalidBind(String),
}

pub(crate) struct HttpConfig {
    pub addr: SocketAddr,
    pub concurrency_limit: usize,
}

/// Listener settings: environment first, then `[server]`.
pub(crate) fn http_config_from_env(config: &Config) -> Result<HttpConfig, HttpConfigError> {
    let concurrency_limit = std::env::var("CELLX_HTTP_MAX_CONC")
        .ok()
        .map(|raw| {
            raw.parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(HttpConfigError::InvalidConcurrency(raw))
        })
        .transpose()?
        .or(config.server.max_concurrency)
        .unwrap_or(DEFAULT_CONCURRENCY);

    let bind = std::env::var("CELLX_BIND").unwrap_or_else(|_| config.server.bind.clone());
    let port = match std::env::var("CELLX_PORT") {
        Ok(raw) => raw
            .parse::<u16>()
            .map_err(|_| HttpConfigError::InvalidPort(raw))?,
        Err(_) => config.server.port,
    };

    let addr = format!("{}:{}", bind, port)
        .parse()
        .map_err(|_| HttpConfigError::InvalidBind(bind.clone()))?;

    Ok(HttpConfig {
        addr,
        concurrency_limit,
    })
}

/// Honors `OPENAPI_OUT`: writes the OpenAPI YAML and the config schema, and
/// returns the path so the caller can exit.
pub(crate) fn ensure_openapi_export() -> Result<Option<String>, std::io::Error> {
    if let Ok(path) = std::env::var("OPENAPI_OUT") {
        export_openapi(&path)?;
        export_config_schema(&path)?;
        return Ok(Some(path));
    }
    Ok(None)
}

fn export_openapi(path: &str) -> Result<(), std::io::Error> {
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = crate::openapi::ApiDoc::openapi()
        .to_yaml()
        .unwrap_or_else(|_| "openapi: 3.1.0".into());
    std::fs::write(path, yaml)
}

fn export_config_schema(openapi_path: &str) -> Result<(), std::io::Error> {
    let target = Path::new(openapi_path)
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(CONFIG_SCHEMA_FILE);
    cellx_core::write_schema_file(&target.to_string_lossy())
}
