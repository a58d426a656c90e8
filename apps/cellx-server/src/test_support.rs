use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float32Array, Int32Array, StringArray};
use cellx_core::engine::{EmbeddingOutput, EmbeddingRequest, LeidenRequest, SankeyRequest};
use cellx_core::{AnalysisEngine, Config, Dataset, EngineError, InMemoryDataset, Mask, UserScope};
use cellx_protocol::{Coordinates, DiffExpResult, DiffExpRow, NeighborGraph, SankeyResult};
use cellx_store::AnnotationStore;
use serde_json::{Map, Value};

use crate::AppState;

pub(crate) const GENES: [&str; 4] = ["CD3E", "MS4A1", "GNLY", "NKG7"];

/// Six cells, four genes, one base embedding, a raw layer.
pub(crate) fn dataset() -> InMemoryDataset {
    let obs = cellx_codec::table(
        vec![
            (
                "name_0".into(),
                Arc::new(StringArray::from(vec!["c0", "c1", "c2", "c3", "c4", "c5"])) as ArrayRef,
            ),
            (
                "tissue".into(),
                cellx_codec::categorical_array(
                    ["heart", "lung", "heart", "heart", "lung", "heart"].map(Some),
                ),
            ),
            (
                "num_reads".into(),
                Arc::new(Float32Array::from(vec![
                    1200.0, 5000.0, 999.0, 1000.0, 300.0, 2500.0,
                ])) as ArrayRef,
            ),
        ],
        6,
    )
    .unwrap();
    let var = cellx_codec::table(
        vec![
            ("name_0".into(), Arc::new(StringArray::from(GENES.to_vec())) as ArrayRef),
            (
                "n_cells".into(),
                Arc::new(Int32Array::from(vec![10, 20, 30, 40])) as ArrayRef,
            ),
        ],
        4,
    )
    .unwrap();
    let layer = |scale: f32| {
        let columns = (0..4)
            .map(|g| {
                let values: Vec<f32> = (0..6).map(|c| scale * (c * 4 + g) as f32).collect();
                (g.to_string(), Arc::new(Float32Array::from(values)) as ArrayRef)
            })
            .collect();
        cellx_codec::table(columns, 6).unwrap()
    };
    InMemoryDataset::builder("pbmc-mini", obs, var)
        .layer("X", layer(1.0))
        .layer("counts", layer(10.0))
        .raw(layer(100.0))
        .embedding(
            "umap",
            Coordinates {
                x: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
                y: vec![5.0, 4.0, 3.0, 2.0, 1.0, 0.0],
            },
        )
        .index_names(Some("name_0".into()), Some("name_0".into()))
        .build()
        .unwrap()
}

/// Deterministic engine that records how often it was asked for work.
#[derive(Debug, Default)]
pub(crate) struct ScriptedEngine {
    pub diffexp_calls: AtomicUsize,
    pub preprocess_calls: AtomicUsize,
    pub sankey_calls: AtomicUsize,
    pub non_finite: AtomicBool,
}

impl AnalysisEngine for ScriptedEngine {
    fn diffexp_top_n(
        &self,
        _dataset: &dyn Dataset,
        set1: &Mask,
        set2: &Mask,
        count: usize,
    ) -> Result<DiffExpResult, EngineError> {
        self.diffexp_calls.fetch_add(1, Ordering::SeqCst);
        let score = if self.non_finite.load(Ordering::SeqCst) {
            f64::NAN
        } else {
            (set1.count() as f64) - (set2.count() as f64)
        };
        let rows = (0..count.min(2) as u32)
            .map(|gene| DiffExpRow(gene, score, 0.01, 0.02))
            .collect();
        Ok(DiffExpResult {
            positive: rows,
            negative: Vec::new(),
        })
    }

    fn compute_embedding(
        &self,
        dataset: &dyn Dataset,
        _scope: &UserScope,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingOutput, EngineError> {
        let n_obs = dataset.shape().0;
        let mut coords = Coordinates {
            x: vec![f32::NAN; n_obs],
            y: vec![f32::NAN; n_obs],
        };
        let selected = request.obs_mask.indices();
        for &i in &selected {
            coords.x[i] = i as f32;
            coords.y[i] = -(i as f32);
        }
        let mut graph = NeighborGraph::default();
        for pair in selected.windows(2) {
            graph.rows.push(pair[0] as i32);
            graph.cols.push(pair[1] as i32);
            graph.weights.push(1.0);
        }
        let mut params = request.params.clone();
        params.insert("method".into(), Value::String(request.method.clone()));
        Ok(EmbeddingOutput {
            coords,
            graph,
            params,
        })
    }

    fn preprocess(
        &self,
        _dataset: &dyn Dataset,
        _scope: &UserScope,
        _params: &Map<String, Value>,
        _obs_mask: &Mask,
    ) -> Result<(), EngineError> {
        self.preprocess_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn leiden(
        &self,
        dataset: &dyn Dataset,
        _scope: &UserScope,
        request: &LeidenRequest,
    ) -> Result<Vec<String>, EngineError> {
        if request.resolution <= 0.0 {
            return Err(EngineError::InvalidInput("resolution must be positive".into()));
        }
        Ok((0..dataset.shape().0)
            .map(|i| {
                if request.obs_mask.get(i) {
                    (i % 2).to_string()
                } else {
                    "unassigned".to_string()
                }
            })
            .collect())
    }

    fn sankey(
        &self,
        _dataset: &dyn Dataset,
        _scope: &UserScope,
        request: &SankeyRequest,
    ) -> Result<SankeyResult, EngineError> {
        self.sankey_calls.fetch_add(1, Ordering::SeqCst);
        let [left, right] = request.labels.as_slice() else {
            return Err(EngineError::InvalidInput("expected two label sets".into()));
        };
        let mut counts: BTreeMap<(String, String), f64> = BTreeMap::new();
        for (i, (a, b)) in left.iter().zip(right).enumerate() {
            if request.obs_mask.get(i) {
                *counts.entry((format!("0_{a}"), format!("1_{b}"))).or_default() += 1.0;
            }
        }
        let (edges, weights) = counts.into_iter().map(|((a, b), w)| ([a, b], w)).unzip();
        Ok(SankeyResult { edges, weights })
    }
}

pub(crate) fn state_with(
    root: &Path,
    config: Config,
    engine: Arc<dyn AnalysisEngine>,
) -> AppState {
    AppState::builder(config, Arc::new(dataset()))
        .with_engine(engine)
        .with_store(AnnotationStore::new(root))
        .build()
}

pub(crate) fn state(root: &Path) -> AppState {
    state_with(root, Config::default(), Arc::new(ScriptedEngine::default()))
}

pub mod env {
    use once_cell::sync::Lazy;
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    /// Serializes environment mutation across tests and restores the
    /// previous values on drop.
    pub struct EnvGuard {
        _lock: MutexGuard<'static, ()>,
        saved: Vec<(&'static str, Option<String>)>,
    }

    pub fn guard() -> EnvGuard {
        EnvGuard {
            _lock: ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
            saved: Vec::new(),
        }
    }

    impl EnvGuard {
        pub fn set(&mut self, key: &'static str, value: &str) {
            self.remember(key);
            std::env::set_var(key, value);
        }

        pub fn remove(&mut self, key: &'static str) {
            self.remember(key);
            std::env::remove_var(key);
        }

        fn remember(&mut self, key: &'static str) {
            if !self.saved.iter().any(|(k, _)| *k == key) {
                self.saved.push((key, std::env::var(key).ok()));
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, val) in self.saved.drain(..).rev() {
                match val {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
