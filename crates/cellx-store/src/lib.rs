//! Per-user, file-backed annotation and embedding state.
//!
//! Each [`UserScope`] owns one directory under the store root:
//!
//! ```text
//! <root>/<scope>/obs.arrow                 user obs labels
//! <root>/<scope>/emb/<name>.arrow          embedding coordinates
//! <root>/<scope>/nnm/<name>.arrow          neighbor graph
//! <root>/<scope>/params/<name>.json        embedding parameters
//! <root>/<scope>/reembed/<collection>.json reembedding parameter document
//! <root>/<scope>/genesets/<collection>.json
//! <root>/<scope>/output/                   transient exports
//! ```
//!
//! Mutations of one scope are serialized through a per-scope async mutex;
//! reads take no lock.

mod embeddings;
mod export;
mod fsutil;
mod genesets;
mod labels;
mod locks;
mod names;
mod params;

pub use cellx_core::UserScope;
pub use embeddings::{EmbeddingRecord, Facet};
pub use export::ExportFile;
pub use genesets::gene_sets_csv;
pub use labels::{validate_labels, RESERVED_LABEL};
pub use locks::ScopeLocks;
pub use names::CollectionName;
pub use params::{strip_internal_params, INTERNAL_PARAM_KEYS};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cellx_core::Dataset;

pub(crate) const EMB_DIR: &str = "emb";
pub(crate) const NNM_DIR: &str = "nnm";
pub(crate) const PARAMS_DIR: &str = "params";
pub(crate) const REEMBED_DIR: &str = "reembed";
pub(crate) const GENESETS_DIR: &str = "genesets";
pub(crate) const OUTPUT_DIR: &str = "output";
pub(crate) const LABELS_FILE: &str = "obs.arrow";

const SKELETON: [&str; 6] = [EMB_DIR, NNM_DIR, PARAMS_DIR, REEMBED_DIR, GENESETS_DIR, OUTPUT_DIR];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid name '{0}'")]
    InvalidName(String),
    #[error("bad annotation collection name '{0}'")]
    UnsafeCollection(String),
    #[error("invalid labels: {0}")]
    InvalidLabels(String),
    #[error("invalid gene sets: {0}")]
    InvalidGeneSets(String),
    #[error("embedding '{name}' has no {facet} artifact")]
    MissingArtifact { name: String, facet: Facet },
    #[error("embedding '{0}' already exists")]
    AlreadyExists(String),
    #[error("obsolete request: tid {tid} is not newer than {current}")]
    Obsolete { tid: u64, current: u64 },
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] cellx_codec::CodecError),
    #[error("stored document is malformed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
}

/// File-backed store partitioned by user scope.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    root: PathBuf,
    locks: Arc<ScopeLocks>,
}

impl AnnotationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(ScopeLocks::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scope_dir(&self, scope: &UserScope) -> PathBuf {
        self.root.join(scope.as_str())
    }

    pub(crate) fn locks(&self) -> &ScopeLocks {
        &self.locks
    }

    /// Create the scope skeleton and seed it with the dataset's own
    /// embeddings. Safe to call repeatedly.
    pub async fn initialize(
        &self,
        scope: &UserScope,
        dataset: &dyn Dataset,
    ) -> Result<(), StoreError> {
        let _guard = self.locks.lock(scope).await;
        let dir = self.scope_dir(scope);
        for sub in SKELETON {
            tokio::fs::create_dir_all(dir.join(sub)).await?;
        }
        let mut seeded = 0usize;
        for name in dataset.embedding_names() {
            if self.has_embedding(scope, &name).await {
                continue;
            }
            let Some(coords) = dataset.embedding(&name) else {
                continue;
            };
            self.write_embedding_unlocked(scope, &name, &EmbeddingRecord::from_coords(coords))
                .await?;
            seeded += 1;
        }
        tracing::debug!(user = %scope, seeded, "scope initialized");
        Ok(())
    }
}
