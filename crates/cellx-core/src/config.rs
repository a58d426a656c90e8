use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file consulted when `CELLX_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "cellx.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config does not match schema: {0}")]
    Invalid(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on in-flight HTTP requests.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_concurrency: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct DatasetConfig {
    /// Directory holding the dataset frames.
    #[serde(default)]
    pub path: Option<String>,
    /// Name used for scoping and display; defaults to the directory name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub obs_names: Option<String>,
    #[serde(default)]
    pub var_names: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct StorageConfig {
    /// Root under which every user scope gets its own directory.
    #[serde(default = "default_storage_root")]
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct FeaturesConfig {
    #[serde(default = "enabled")]
    pub user_annotations: bool,
    #[serde(default = "enabled")]
    pub gene_sets_save: bool,
    #[serde(default = "enabled")]
    pub diffexp: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            user_annotations: true,
            gene_sets_save: true,
            diffexp: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct LimitsConfig {
    /// Maximum number of columns one request may ask for.
    #[serde(default = "default_column_request_max")]
    pub column_request_max: usize,
    /// Maximum cells per differential-expression set; unlimited when absent.
    #[serde(default)]
    pub diffexp_cellcount_max: Option<usize>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            column_request_max: default_column_request_max(),
            diffexp_cellcount_max: None,
        }
    }
}

impl LimitsConfig {
    pub fn exceeds_column_limit(&self, requested: usize) -> bool {
        requested > self.column_request_max
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ScopeConfig {
    /// Request header carrying the opaque user identifier.
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            user_header: default_user_header(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
}

fn default_bind() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5005
}

fn default_storage_root() -> String {
    "cellx-data".into()
}

fn enabled() -> bool {
    true
}

fn default_column_request_max() -> usize {
    32
}

fn default_user_header() -> String {
    "x-cellx-user".into()
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema = schemars::schema_for!(Config);
    let schema_value = serde_json::to_value(&schema).expect("schema value");
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing the configuration structure.
///
/// # Panics
///
/// Panics if schema generation fails; this indicates a programming error.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).expect("schema json")
}

pub fn write_schema_file(path: &str) -> std::io::Result<()> {
    let schema_json = config_schema_json();
    std::fs::write(path, serde_json::to_string_pretty(&schema_json)?)
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let raw: toml::Table = toml::from_str(content)?;
    let json_value = serde_json::to_value(&raw)?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(ConfigError::Invalid(validation_errors.join(", ")));
    }
    Ok(toml::from_str(content)?)
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Load `CELLX_CONFIG`, else `./cellx.toml` when present, else defaults,
/// then apply the storage and dataset environment overrides.
pub fn resolve_config() -> Result<Config, ConfigError> {
    let mut cfg = match std::env::var("CELLX_CONFIG") {
        Ok(path) if !path.trim().is_empty() => load_config(Path::new(path.trim()))?,
        _ => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            if fallback.is_file() {
                load_config(fallback)?
            } else {
                Config::default()
            }
        }
    };
    cfg.apply_env();
    Ok(cfg)
}

impl Config {
    pub fn apply_env(&mut self) {
        if let Some(root) = non_empty_env("CELLX_STORAGE_ROOT") {
            self.storage.root = root;
        }
        if let Some(path) = non_empty_env("CELLX_DATASET") {
            self.dataset.path = Some(path);
        }
    }

    /// Dataset name: configured, else the final path component.
    pub fn dataset_name(&self) -> String {
        if let Some(name) = self.dataset.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.dataset
            .path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("dataset")
            .to_string()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
