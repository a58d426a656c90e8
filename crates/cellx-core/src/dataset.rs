//! Read-only view of the base dataset.
//!
//! Every layer is a table with one float32 column per variable and one row
//! per observation. Embeddings shipped with the dataset are planar
//! coordinate tables with `x` and `y` columns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float32Array, RecordBatch};
use arrow::datatypes::DataType;
use cellx_codec::CodecError;
use cellx_protocol::Coordinates;

/// Name of the default expression layer.
pub const DEFAULT_LAYER: &str = "X";
/// Name under which unprocessed counts are exposed.
pub const RAW_LAYER: &str = ".raw";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("unknown layer '{0}'")]
    UnknownLayer(String),
    #[error("variable index {index} is out of bounds ({n_var} variables)")]
    VarOutOfBounds { index: usize, n_var: usize },
    #[error("inconsistent dataset: {0}")]
    Shape(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
}

/// Adaptor over the immutable base dataset.
pub trait Dataset: Send + Sync {
    fn name(&self) -> &str;
    /// `(n_obs, n_var)`
    fn shape(&self) -> (usize, usize);
    /// Value type of the default layer, as reported in the schema.
    fn x_dtype(&self) -> String;
    fn obs(&self) -> &RecordBatch;
    fn var(&self) -> &RecordBatch;
    fn obs_index(&self) -> Option<&str>;
    fn var_index(&self) -> Option<&str>;
    /// Declared layers, excluding the raw layer.
    fn layers(&self) -> Vec<String>;
    fn has_raw(&self) -> bool;
    /// One float32 column per requested variable, named by its index.
    /// With `logscale`, values are transformed as `ln(1 + x)`.
    fn layer_columns(
        &self,
        layer: &str,
        var_indices: &[usize],
        logscale: bool,
    ) -> Result<RecordBatch, DatasetError>;
    fn embedding_names(&self) -> Vec<String>;
    fn embedding(&self, name: &str) -> Option<Coordinates>;
}

#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    name: String,
    obs: RecordBatch,
    var: RecordBatch,
    obs_index: Option<String>,
    var_index: Option<String>,
    layers: BTreeMap<String, RecordBatch>,
    raw: Option<RecordBatch>,
    embeddings: BTreeMap<String, Coordinates>,
}

#[derive(Debug)]
pub struct InMemoryDatasetBuilder {
    inner: InMemoryDataset,
}

impl InMemoryDatasetBuilder {
    pub fn layer(mut self, name: impl Into<String>, table: RecordBatch) -> Self {
        self.inner.layers.insert(name.into(), table);
        self
    }

    pub fn raw(mut self, table: RecordBatch) -> Self {
        self.inner.raw = Some(table);
        self
    }

    pub fn embedding(mut self, name: impl Into<String>, coords: Coordinates) -> Self {
        self.inner.embeddings.insert(name.into(), coords);
        self
    }

    pub fn index_names(mut self, obs: Option<String>, var: Option<String>) -> Self {
        self.inner.obs_index = obs;
        self.inner.var_index = var;
        self
    }

    pub fn build(self) -> Result<InMemoryDataset, DatasetError> {
        let ds = self.inner;
        let (n_obs, n_var) = (ds.obs.num_rows(), ds.var.num_rows());
        let tables = ds
            .layers
            .iter()
            .map(|(name, t)| (name.as_str(), t))
            .chain(ds.raw.iter().map(|t| (RAW_LAYER, t)));
        for (name, table) in tables {
            if table.num_rows() != n_obs || table.num_columns() != n_var {
                return Err(DatasetError::Shape(format!(
                    "layer '{name}' is {}x{}, expected {n_obs}x{n_var}",
                    table.num_rows(),
                    table.num_columns()
                )));
            }
        }
        for (name, coords) in &ds.embeddings {
            if !coords.is_consistent() || coords.len() != n_obs {
                return Err(DatasetError::Shape(format!(
                    "embedding '{name}' does not have {n_obs} planar coordinates"
                )));
            }
        }
        Ok(ds)
    }
}

impl InMemoryDataset {
    pub fn builder(name: impl Into<String>, obs: RecordBatch, var: RecordBatch) -> InMemoryDatasetBuilder {
        InMemoryDatasetBuilder {
            inner: InMemoryDataset {
                name: name.into(),
                obs,
                var,
                obs_index: None,
                var_index: None,
                layers: BTreeMap::new(),
                raw: None,
                embeddings: BTreeMap::new(),
            },
        }
    }

    /// Load a dataset directory of frames:
    /// `obs.arrow`, `var.arrow`, `X.arrow`, optional `raw.arrow`,
    /// `layers/<name>.arrow` and `embeddings/<name>.arrow`.
    pub fn load_dir(name: impl Into<String>, dir: &Path) -> Result<Self, DatasetError> {
        let obs = read_frame(&dir.join("obs.arrow"))?;
        let var = read_frame(&dir.join("var.arrow"))?;
        let mut builder = Self::builder(name, obs, var)
            .layer(DEFAULT_LAYER, read_frame(&dir.join("X.arrow"))?);
        let raw = dir.join("raw.arrow");
        if raw.is_file() {
            builder = builder.raw(read_frame(&raw)?);
        }
        for (layer, path) in frames_in(&dir.join("layers"))? {
            builder = builder.layer(layer, read_frame(&path)?);
        }
        for (emb, path) in frames_in(&dir.join("embeddings"))? {
            let table = read_frame(&path)?;
            let coords = coordinates_from_table(&table).map_err(|source| DatasetError::Decode {
                path: path.clone(),
                source,
            })?;
            builder = builder.embedding(emb, coords);
        }
        let ds = builder.build()?;
        tracing::info!(
            dataset = %ds.name,
            n_obs = ds.obs.num_rows(),
            n_var = ds.var.num_rows(),
            layers = ds.layers.len(),
            embeddings = ds.embeddings.len(),
            "dataset loaded"
        );
        Ok(ds)
    }

    fn layer_table(&self, layer: &str) -> Result<&RecordBatch, DatasetError> {
        if layer == RAW_LAYER {
            return self
                .raw
                .as_ref()
                .ok_or_else(|| DatasetError::UnknownLayer(layer.to_string()));
        }
        self.layers
            .get(layer)
            .ok_or_else(|| DatasetError::UnknownLayer(layer.to_string()))
    }
}

fn read_frame(path: &Path) -> Result<RecordBatch, DatasetError> {
    let bytes = std::fs::read(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    cellx_codec::decode(&bytes)
        .map(|frame| frame.table)
        .map_err(|source| DatasetError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

fn frames_in(dir: &Path) -> Result<Vec<(String, PathBuf)>, DatasetError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("arrow") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            out.push((stem.to_string(), path.clone()));
        }
    }
    out.sort();
    Ok(out)
}

/// Planar coordinates from a table with float `x` and `y` columns.
pub fn coordinates_from_table(table: &RecordBatch) -> Result<Coordinates, CodecError> {
    let x = cellx_codec::float32_values(table.column(cellx_codec::column_index(table, "x")?))?;
    let y = cellx_codec::float32_values(table.column(cellx_codec::column_index(table, "y")?))?;
    Ok(Coordinates { x, y })
}

/// Inverse of [`coordinates_from_table`].
pub fn coordinates_to_table(coords: &Coordinates) -> Result<RecordBatch, CodecError> {
    cellx_codec::table(
        vec![
            ("x".into(), Arc::new(Float32Array::from(coords.x.clone())) as ArrayRef),
            ("y".into(), Arc::new(Float32Array::from(coords.y.clone())) as ArrayRef),
        ],
        coords.len(),
    )
}

impl Dataset for InMemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> (usize, usize) {
        (self.obs.num_rows(), self.var.num_rows())
    }

    fn x_dtype(&self) -> String {
        self.layers
            .get(DEFAULT_LAYER)
            .and_then(|t| t.columns().first())
            .map(|c| match c.data_type() {
                DataType::Float64 => "float64".to_string(),
                DataType::Int32 => "int32".to_string(),
                _ => "float32".to_string(),
            })
            .unwrap_or_else(|| "float32".to_string())
    }

    fn obs(&self) -> &RecordBatch {
        &self.obs
    }

    fn var(&self) -> &RecordBatch {
        &self.var
    }

    fn obs_index(&self) -> Option<&str> {
        self.obs_index.as_deref()
    }

    fn var_index(&self) -> Option<&str> {
        self.var_index.as_deref()
    }

    fn layers(&self) -> Vec<String> {
        self.layers.keys().cloned().collect()
    }

    fn has_raw(&self) -> bool {
        self.raw.is_some()
    }

    fn layer_columns(
        &self,
        layer: &str,
        var_indices: &[usize],
        logscale: bool,
    ) -> Result<RecordBatch, DatasetError> {
        let table = self.layer_table(layer)?;
        let n_var = table.num_columns();
        let mut columns = Vec::with_capacity(var_indices.len());
        for &index in var_indices {
            if index >= n_var {
                return Err(DatasetError::VarOutOfBounds { index, n_var });
            }
            let mut values = cellx_codec::float32_values(table.column(index).as_ref())
                .map_err(|e| DatasetError::Shape(e.to_string()))?;
            if logscale {
                for v in &mut values {
                    *v = v.ln_1p();
                }
            }
            columns.push((index.to_string(), Arc::new(Float32Array::from(values)) as ArrayRef));
        }
        cellx_codec::table(columns, table.num_rows()).map_err(|e| DatasetError::Shape(e.to_string()))
    }

    fn embedding_names(&self) -> Vec<String> {
        self.embeddings.keys().cloned().collect()
    }

    fn embedding(&self, name: &str) -> Option<Coordinates> {
        self.embeddings.get(name).cloned()
    }
}
