use std::sync::Arc;

use cellx_core::{AnalysisEngine, Config, Dataset, NoopEngine};
use cellx_store::AnnotationStore;

#[derive(Clone)]
pub(crate) struct AppState {
    config: Arc<Config>,
    dataset: Arc<dyn Dataset>,
    engine: Arc<dyn AnalysisEngine>,
    store: AnnotationStore,
}

impl AppState {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dataset(&self) -> &dyn Dataset {
        self.dataset.as_ref()
    }

    /// Owned handle for work moved onto the blocking pool.
    pub fn dataset_handle(&self) -> Arc<dyn Dataset> {
        self.dataset.clone()
    }

    pub fn engine_handle(&self) -> Arc<dyn AnalysisEngine> {
        self.engine.clone()
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub(crate) fn builder(config: Config, dataset: Arc<dyn Dataset>) -> AppStateBuilder {
        AppStateBuilder {
            config,
            dataset,
            engine: None,
            store: None,
        }
    }
}

pub(crate) struct AppStateBuilder {
    config: Config,
    dataset: Arc<dyn Dataset>,
    engine: Option<Arc<dyn AnalysisEngine>>,
    store: Option<AnnotationStore>,
}

impl AppStateBuilder {
    pub(crate) fn with_engine(mut self, engine: Arc<dyn AnalysisEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub(crate) fn with_store(mut self, store: AnnotationStore) -> Self {
        self.store = Some(store);
        self
    }

    pub(crate) fn build(self) -> AppState {
        let store = self
            .store
            .unwrap_or_else(|| AnnotationStore::new(&self.config.storage.root));
        AppState {
            engine: self.engine.unwrap_or_else(|| Arc::new(NoopEngine)),
            store,
            dataset: self.dataset,
            config: Arc::new(self.config),
        }
    }
}
