//! Dataset-facing building blocks shared by the service: the filter query
//! language, mask evaluation, the dataset adaptor, the analysis engine seam
//! and configuration.

mod config;
pub use config::{
    config_schema_json, load_config, resolve_config, write_schema_file, Config, ConfigError,
    DatasetConfig, FeaturesConfig, LimitsConfig, ScopeConfig, ServerConfig, StorageConfig,
};
pub mod dataset;
pub mod engine;
pub mod mask;
pub mod query;
pub mod scope;
pub mod util;

#[cfg(test)]
mod test_support;

pub use dataset::{Dataset, DatasetError, InMemoryDataset};
pub use engine::{AnalysisEngine, EngineError, NoopEngine};
pub use mask::Mask;
pub use query::{parse_filter, parse_query_string, FilterError, QueryParams};
pub use scope::UserScope;
