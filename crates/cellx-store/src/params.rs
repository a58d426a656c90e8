use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::fsutil::{read_optional, save_bytes_atomic};
use crate::names::collection_stem;
use crate::{AnnotationStore, CollectionName, StoreError, UserScope, REEMBED_DIR};

/// Keys kept only to reproduce an embedding; never returned to clients.
pub const INTERNAL_PARAM_KEYS: [&str; 4] =
    ["parentParams", "sample_ids", "feature_ids", "feature_weights"];

pub fn strip_internal_params(mut params: Map<String, Value>) -> Map<String, Value> {
    for key in INTERNAL_PARAM_KEYS {
        params.remove(key);
    }
    params
}

impl AnnotationStore {
    /// Parameters of one embedding as shown to clients; `None` when the
    /// embedding has no parameter record.
    pub async fn read_reembed_params(
        &self,
        scope: &UserScope,
        embedding: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        Ok(self
            .read_embedding_params(scope, embedding)
            .await?
            .map(strip_internal_params))
    }

    fn reembed_document_path(
        &self,
        scope: &UserScope,
        collection: Option<&CollectionName>,
    ) -> PathBuf {
        self.scope_dir(scope)
            .join(REEMBED_DIR)
            .join(format!("{}.json", collection_stem(collection)))
    }

    /// The saved reembedding parameter document, empty when never written.
    pub async fn read_reembed_document(
        &self,
        scope: &UserScope,
        collection: Option<&CollectionName>,
    ) -> Result<Map<String, Value>, StoreError> {
        let path = self.reembed_document_path(scope, collection);
        match read_optional(&path).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Map::new()),
        }
    }

    pub async fn write_reembed_document(
        &self,
        scope: &UserScope,
        collection: Option<&CollectionName>,
        document: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let _guard = self.locks().lock(scope).await;
        save_bytes_atomic(&self.reembed_document_path(scope, collection), &bytes).await?;
        Ok(())
    }
}
