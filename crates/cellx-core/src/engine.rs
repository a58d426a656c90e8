//! Seam to the numeric analysis engine.
//!
//! Differential expression, clustering, preprocessing and embedding are
//! computed elsewhere; the service only prepares inputs and shapes results.
//! Calls are blocking, so async callers run them on the blocking pool.

use cellx_protocol::{Coordinates, DiffExpResult, NeighborGraph, SankeyResult};
use serde_json::{Map, Value};

use crate::dataset::Dataset;
use crate::mask::Mask;
use crate::scope::UserScope;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine does not provide this computation.
    #[error("{0}")]
    Unsupported(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Failed(String),
}

/// A previously stored embedding used as the starting point of a new one.
#[derive(Debug, Clone)]
pub struct ParentEmbedding {
    pub name: String,
    pub coords: Coordinates,
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub method: String,
    pub obs_mask: Mask,
    pub params: Map<String, Value>,
    pub parent: Option<ParentEmbedding>,
}

/// Coordinates cover every observation; unselected rows are NaN.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingOutput {
    pub coords: Coordinates,
    pub graph: NeighborGraph,
    /// Parameters actually used, merged over the request's.
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct LeidenRequest {
    pub embedding: String,
    pub graph: NeighborGraph,
    pub resolution: f64,
    pub obs_mask: Mask,
}

#[derive(Debug, Clone)]
pub struct SankeyRequest {
    /// One label per observation, per label set.
    pub labels: Vec<Vec<String>>,
    pub graph: Option<NeighborGraph>,
    pub obs_mask: Mask,
}

pub trait AnalysisEngine: Send + Sync {
    fn diffexp_top_n(
        &self,
        dataset: &dyn Dataset,
        set1: &Mask,
        set2: &Mask,
        count: usize,
    ) -> Result<DiffExpResult, EngineError>;

    fn compute_embedding(
        &self,
        dataset: &dyn Dataset,
        scope: &UserScope,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingOutput, EngineError>;

    fn preprocess(
        &self,
        dataset: &dyn Dataset,
        scope: &UserScope,
        params: &Map<String, Value>,
        obs_mask: &Mask,
    ) -> Result<(), EngineError>;

    /// Cluster assignments, one per observation.
    fn leiden(
        &self,
        dataset: &dyn Dataset,
        scope: &UserScope,
        request: &LeidenRequest,
    ) -> Result<Vec<String>, EngineError>;

    fn sankey(
        &self,
        dataset: &dyn Dataset,
        scope: &UserScope,
        request: &SankeyRequest,
    ) -> Result<SankeyResult, EngineError>;
}

/// Engine used when no analysis backend is wired in; every computation is
/// reported as unsupported.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEngine;

impl NoopEngine {
    fn unsupported<T>(what: &str) -> Result<T, EngineError> {
        Err(EngineError::Unsupported(format!(
            "{what} requires an analysis engine"
        )))
    }
}

impl AnalysisEngine for NoopEngine {
    fn diffexp_top_n(
        &self,
        _dataset: &dyn Dataset,
        _set1: &Mask,
        _set2: &Mask,
        _count: usize,
    ) -> Result<DiffExpResult, EngineError> {
        Self::unsupported("differential expression")
    }

    fn compute_embedding(
        &self,
        _dataset: &dyn Dataset,
        _scope: &UserScope,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingOutput, EngineError> {
        Self::unsupported(&format!("embedding method '{}'", request.method))
    }

    fn preprocess(
        &self,
        _dataset: &dyn Dataset,
        _scope: &UserScope,
        _params: &Map<String, Value>,
        _obs_mask: &Mask,
    ) -> Result<(), EngineError> {
        Self::unsupported("preprocessing")
    }

    fn leiden(
        &self,
        _dataset: &dyn Dataset,
        _scope: &UserScope,
        _request: &LeidenRequest,
    ) -> Result<Vec<String>, EngineError> {
        Self::unsupported("clustering")
    }

    fn sankey(
        &self,
        _dataset: &dyn Dataset,
        _scope: &UserScope,
        _request: &SankeyRequest,
    ) -> Result<SankeyResult, EngineError> {
        Self::unsupported("sankey")
    }
}
