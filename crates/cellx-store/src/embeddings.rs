use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{ArrayRef, AsArray, Float32Array, Int32Array, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Int32Type};
use cellx_core::dataset::{coordinates_from_table, coordinates_to_table};
use cellx_protocol::{Axis, Coordinates, NeighborGraph};
use serde_json::{Map, Value};
use tokio::fs as afs;

use crate::fsutil::{exists, read_optional, remove_if_exists, save_bytes_atomic};
use crate::names::check_embedding_name;
use crate::{AnnotationStore, StoreError, UserScope, EMB_DIR, NNM_DIR, PARAMS_DIR};

/// The three artifacts stored for every embedding name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facet {
    Coordinates,
    Graph,
    Params,
}

impl Facet {
    pub const ALL: [Facet; 3] = [Facet::Coordinates, Facet::Graph, Facet::Params];

    fn dir(self) -> &'static str {
        match self {
            Facet::Coordinates => EMB_DIR,
            Facet::Graph => NNM_DIR,
            Facet::Params => PARAMS_DIR,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Facet::Coordinates | Facet::Graph => "arrow",
            Facet::Params => "json",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Facet::Coordinates => "coordinates",
            Facet::Graph => "neighbor graph",
            Facet::Params => "parameters",
        })
    }
}

/// One logical embedding: coordinates, neighbor graph and the parameters
/// that reproduce it. Stored, renamed and deleted as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingRecord {
    pub coords: Coordinates,
    pub graph: NeighborGraph,
    pub params: Map<String, Value>,
}

impl EmbeddingRecord {
    pub fn from_coords(coords: Coordinates) -> Self {
        Self {
            coords,
            ..Self::default()
        }
    }
}

fn graph_to_table(graph: &NeighborGraph) -> Result<RecordBatch, StoreError> {
    Ok(cellx_codec::table(
        vec![
            ("row".into(), Arc::new(Int32Array::from(graph.rows.clone())) as ArrayRef),
            ("col".into(), Arc::new(Int32Array::from(graph.cols.clone())) as ArrayRef),
            (
                "weight".into(),
                Arc::new(Float32Array::from(graph.weights.clone())) as ArrayRef,
            ),
        ],
        graph.edge_count(),
    )?)
}

fn int_column(table: &RecordBatch, name: &str) -> Result<Vec<i32>, StoreError> {
    let column = table.column(cellx_codec::column_index(table, name)?);
    let ints = cast(column, &DataType::Int32).map_err(cellx_codec::CodecError::from)?;
    Ok(ints
        .as_primitive::<Int32Type>()
        .iter()
        .map(|v| v.unwrap_or_default())
        .collect())
}

fn graph_from_table(table: &RecordBatch) -> Result<NeighborGraph, StoreError> {
    let weights = cellx_codec::float32_values(
        table
            .column(cellx_codec::column_index(table, "weight")?)
            .as_ref(),
    )?;
    Ok(NeighborGraph {
        rows: int_column(table, "row")?,
        cols: int_column(table, "col")?,
        weights,
    })
}

impl AnnotationStore {
    pub(crate) fn facet_path(&self, scope: &UserScope, facet: Facet, name: &str) -> PathBuf {
        self.scope_dir(scope)
            .join(facet.dir())
            .join(format!("{name}.{}", facet.extension()))
    }

    /// Embedding names present in the scope, sorted.
    pub async fn list_embeddings(&self, scope: &UserScope) -> Result<Vec<String>, StoreError> {
        let dir = self.scope_dir(scope).join(EMB_DIR);
        let mut entries = match afs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = file_name.strip_suffix(".arrow") {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn has_embedding(&self, scope: &UserScope, name: &str) -> bool {
        check_embedding_name(name).is_ok()
            && exists(&self.facet_path(scope, Facet::Coordinates, name)).await
    }

    pub async fn read_coordinates(
        &self,
        scope: &UserScope,
        name: &str,
    ) -> Result<Option<Coordinates>, StoreError> {
        check_embedding_name(name)?;
        let path = self.facet_path(scope, Facet::Coordinates, name);
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };
        let frame = cellx_codec::decode(&bytes)?;
        Ok(Some(coordinates_from_table(&frame.table)?))
    }

    pub async fn read_graph(
        &self,
        scope: &UserScope,
        name: &str,
    ) -> Result<Option<NeighborGraph>, StoreError> {
        check_embedding_name(name)?;
        let path = self.facet_path(scope, Facet::Graph, name);
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };
        let frame = cellx_codec::decode(&bytes)?;
        Ok(Some(graph_from_table(&frame.table)?))
    }

    /// Stored parameters including reproduction-only internals.
    pub async fn read_embedding_params(
        &self,
        scope: &UserScope,
        name: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        check_embedding_name(name)?;
        let path = self.facet_path(scope, Facet::Params, name);
        match read_optional(&path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The full record; `None` when the coordinates are absent. Missing
    /// graph or parameters read as empty.
    pub async fn read_embedding(
        &self,
        scope: &UserScope,
        name: &str,
    ) -> Result<Option<EmbeddingRecord>, StoreError> {
        let Some(coords) = self.read_coordinates(scope, name).await? else {
            return Ok(None);
        };
        Ok(Some(EmbeddingRecord {
            coords,
            graph: self.read_graph(scope, name).await?.unwrap_or_default(),
            params: self
                .read_embedding_params(scope, name)
                .await?
                .unwrap_or_default(),
        }))
    }

    pub async fn write_embedding(
        &self,
        scope: &UserScope,
        name: &str,
        record: &EmbeddingRecord,
    ) -> Result<(), StoreError> {
        let _guard = self.locks().lock(scope).await;
        self.write_embedding_unlocked(scope, name, record).await
    }

    pub(crate) async fn write_embedding_unlocked(
        &self,
        scope: &UserScope,
        name: &str,
        record: &EmbeddingRecord,
    ) -> Result<(), StoreError> {
        check_embedding_name(name)?;
        let coords = cellx_codec::encode(&coordinates_to_table(&record.coords)?, Axis::Obs)?;
        let graph = cellx_codec::encode(&graph_to_table(&record.graph)?, Axis::Obs)?;
        let params = serde_json::to_vec(&record.params)?;
        // coordinates last; listing keys off them
        save_bytes_atomic(&self.facet_path(scope, Facet::Graph, name), &graph).await?;
        save_bytes_atomic(&self.facet_path(scope, Facet::Params, name), &params).await?;
        save_bytes_atomic(&self.facet_path(scope, Facet::Coordinates, name), &coords).await?;
        tracing::debug!(user = %scope, embedding = name, "embedding stored");
        Ok(())
    }

    /// Store `record` under `base`, or under the first free `base_1`,
    /// `base_2`, ... The name is picked while the scope lock is held.
    pub async fn write_embedding_unique(
        &self,
        scope: &UserScope,
        base: &str,
        record: &EmbeddingRecord,
    ) -> Result<String, StoreError> {
        check_embedding_name(base)?;
        let _guard = self.locks().lock(scope).await;
        let name = self.unique_embedding_name(scope, base).await;
        self.write_embedding_unlocked(scope, &name, record).await?;
        Ok(name)
    }

    /// `base` if free, else the first free `base_1`, `base_2`, ...
    /// Does not lock; pair with [`Self::write_embedding_unique`] to claim it.
    pub async fn unique_embedding_name(&self, scope: &UserScope, base: &str) -> String {
        if !self.has_embedding(scope, base).await {
            return base.to_string();
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("{base}_{n}");
            if !self.has_embedding(scope, &candidate).await {
                return candidate;
            }
            n += 1;
        }
    }

    /// Remove every artifact of each name. Missing artifacts are skipped;
    /// other failures do not stop the remaining removals and the first one
    /// is returned. Yields the number of artifacts removed.
    pub async fn delete_embeddings(
        &self,
        scope: &UserScope,
        names: &[String],
    ) -> Result<usize, StoreError> {
        for name in names {
            check_embedding_name(name)?;
        }
        let _guard = self.locks().lock(scope).await;
        let mut removed = 0usize;
        let mut first_error: Option<StoreError> = None;
        for name in names {
            for facet in Facet::ALL {
                let path = self.facet_path(scope, facet, name);
                match remove_if_exists(&path).await {
                    Ok(true) => removed += 1,
                    Ok(false) => {
                        tracing::debug!(user = %scope, embedding = %name, %facet, "artifact already absent");
                    }
                    Err(err) => {
                        tracing::warn!(user = %scope, embedding = %name, %facet, error = %err, "artifact removal failed");
                        first_error.get_or_insert(err.into());
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }

    /// Rename each embedding by substituting `from` with `to` in its name,
    /// moving all three artifacts. Every source artifact must exist and no
    /// target may be taken before anything moves; a failed move rolls back
    /// the moves already made. Returns the `(old, new)` pairs.
    pub async fn rename_embeddings(
        &self,
        scope: &UserScope,
        names: &[String],
        from: &str,
        to: &str,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let _guard = self.locks().lock(scope).await;

        let mut plan = Vec::with_capacity(names.len());
        let mut targets = HashSet::new();
        for name in names {
            check_embedding_name(name)?;
            let target = name.replace(from, to);
            check_embedding_name(&target)?;
            for facet in Facet::ALL {
                if !exists(&self.facet_path(scope, facet, name)).await {
                    return Err(StoreError::MissingArtifact {
                        name: name.clone(),
                        facet,
                    });
                }
            }
            if target == *name {
                continue;
            }
            if !targets.insert(target.clone())
                || exists(&self.facet_path(scope, Facet::Coordinates, &target)).await
            {
                return Err(StoreError::AlreadyExists(target));
            }
            plan.push((name.clone(), target));
        }

        let mut done: Vec<(PathBuf, PathBuf)> = Vec::new();
        for (name, target) in &plan {
            for facet in Facet::ALL {
                let src = self.facet_path(scope, facet, name);
                let dst = self.facet_path(scope, facet, target);
                if let Err(err) = afs::rename(&src, &dst).await {
                    tracing::warn!(user = %scope, embedding = %name, %facet, error = %err, "rename failed, rolling back");
                    for (moved_src, moved_dst) in done.iter().rev() {
                        if let Err(undo) = afs::rename(moved_dst, moved_src).await {
                            tracing::error!(path = %moved_dst.display(), error = %undo, "rollback failed");
                        }
                    }
                    return Err(err.into());
                }
                done.push((src, dst));
            }
        }
        tracing::debug!(user = %scope, renamed = plan.len(), "embeddings renamed");
        Ok(plan)
    }
}
