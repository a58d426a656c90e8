use std::mem;

use axum::{
    handler::Handler,
    routing::{get, post, put},
    Router,
};

use crate::{api, AppState};

pub(crate) struct RouterBuilder {
    router: Router<AppState>,
    endpoints: Vec<String>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            endpoints: Vec::new(),
        }
    }

    fn record(&mut self, method: &str, path: &'static str) {
        self.endpoints.push(format!("{} {}", method, path));
    }

    pub fn route_get<H, T>(&mut self, path: &'static str, handler: H) -> &mut Self
    where
        H: Handler<T, AppState> + Clone + 'static,
        T: Send + 'static,
    {
        self.record("GET", path);
        let router = mem::take(&mut self.router);
        self.router = router.route(path, get(handler));
        self
    }

    pub fn route_post<H, T>(&mut self, path: &'static str, handler: H) -> &mut Self
    where
        H: Handler<T, AppState> + Clone + 'static,
        T: Send + 'static,
    {
        self.record("POST", path);
        let router = mem::take(&mut self.router);
        self.router = router.route(path, post(handler));
        self
    }

    pub fn route_put<H, T>(&mut self, path: &'static str, handler: H) -> &mut Self
    where
        H: Handler<T, AppState> + Clone + 'static,
        T: Send + 'static,
    {
        self.record("PUT", path);
        let router = mem::take(&mut self.router);
        self.router = router.route(path, put(handler));
        self
    }

    pub fn build(self) -> (Router<AppState>, Vec<String>) {
        (self.router, self.endpoints)
    }
}

pub(crate) mod paths {
    pub const HEALTHZ: &str = "/healthz";
    pub const SCHEMA: &str = "/api/v0.2/schema";
    pub const CONFIG: &str = "/api/v0.2/config";
    pub const USERINFO: &str = "/api/v0.2/userinfo";
    pub const INITIALIZE: &str = "/api/v0.2/initialize";
    pub const ANNOTATIONS_OBS: &str = "/api/v0.2/annotations/obs";
    pub const ANNOTATIONS_VAR: &str = "/api/v0.2/annotations/var";
    pub const DATA_VAR: &str = "/api/v0.2/data/var";
    pub const SUMMARY_VAR: &str = "/api/v0.2/summary/var";
    pub const DIFFEXP_OBS: &str = "/api/v0.2/diffexp/obs";
    pub const LAYOUT_OBS: &str = "/api/v0.2/layout/obs";
    pub const LAYOUT_OBSM_DELETE: &str = "/api/v0.2/layout/obsm/delete";
    pub const LAYOUT_OBSM_RENAME: &str = "/api/v0.2/layout/obsm/rename";
    pub const SANKEY: &str = "/api/v0.2/sankey";
    pub const LEIDEN: &str = "/api/v0.2/leiden";
    pub const PREPROCESS: &str = "/api/v0.2/preprocess";
    pub const OUTPUT: &str = "/api/v0.2/output";
    pub const OUTPUT_GENE: &str = "/api/v0.2/outputgene";
    pub const REEMBED_PARAMETERS: &str = "/api/v0.2/reembed-parameters";
    pub const REEMBED_PARAMETERS_OBSM: &str = "/api/v0.2/reembed-parameters-obsm";
    pub const GENESETS: &str = "/api/v0.2/genesets";
}

pub(crate) fn build_router() -> (Router<AppState>, Vec<String>) {
    let mut builder = RouterBuilder::new();
    builder.route_get(paths::HEALTHZ, api::meta::healthz);
    register_meta_routes(&mut builder);
    register_data_routes(&mut builder);
    register_annotation_routes(&mut builder);
    register_layout_routes(&mut builder);
    register_compute_routes(&mut builder);
    builder.build()
}

fn register_meta_routes(builder: &mut RouterBuilder) {
    builder
        .route_get(paths::SCHEMA, api::meta::schema_get)
        .route_get(paths::CONFIG, api::meta::config_get)
        .route_get(paths::USERINFO, api::meta::userinfo_get)
        .route_put(paths::INITIALIZE, api::meta::initialize_put);
}

fn register_data_routes(builder: &mut RouterBuilder) {
    builder
        .route_get(paths::DATA_VAR, api::data::var_get)
        .route_put(paths::DATA_VAR, api::data::var_put)
        .route_get(paths::SUMMARY_VAR, api::data::summary_get)
        .route_post(paths::SUMMARY_VAR, api::data::summary_post)
        .route_post(paths::DIFFEXP_OBS, api::diffexp::obs_post);
}

fn register_annotation_routes(builder: &mut RouterBuilder) {
    builder
        .route_get(paths::ANNOTATIONS_OBS, api::annotations::obs_get)
        .route_put(paths::ANNOTATIONS_OBS, api::annotations::obs_put)
        .route_get(paths::ANNOTATIONS_VAR, api::annotations::var_get)
        .route_get(paths::GENESETS, api::genesets::genesets_get)
        .route_put(paths::GENESETS, api::genesets::genesets_put)
        .route_get(
            paths::REEMBED_PARAMETERS,
            api::genesets::reembed_parameters_get,
        )
        .route_put(
            paths::REEMBED_PARAMETERS,
            api::genesets::reembed_parameters_put,
        )
        .route_put(paths::OUTPUT, api::exports::labels_put)
        .route_put(paths::OUTPUT_GENE, api::exports::genesets_put);
}

fn register_layout_routes(builder: &mut RouterBuilder) {
    builder
        .route_get(paths::LAYOUT_OBS, api::layout::obs_get)
        .route_put(paths::LAYOUT_OBS, api::layout::obs_put)
        .route_put(paths::LAYOUT_OBSM_DELETE, api::layout::obsm_delete_put)
        .route_put(paths::LAYOUT_OBSM_RENAME, api::layout::obsm_rename_put)
        .route_put(
            paths::REEMBED_PARAMETERS_OBSM,
            api::layout::reembed_parameters_obsm_put,
        );
}

fn register_compute_routes(builder: &mut RouterBuilder) {
    builder
        .route_put(paths::SANKEY, api::compute::sankey_put)
        .route_put(paths::LEIDEN, api::compute::leiden_put)
        .route_put(paths::PREPROCESS, api::compute::preprocess_put);
}
