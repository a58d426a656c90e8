use utoipa::{OpenApi, ToSchema};

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct HealthOk {
    pub ok: bool,
}

/// RFC 7807 body returned by every failing endpoint.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct Problem {
    #[schema(example = "about:blank")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    #[schema(nullable, value_type = Option<String>)]
    pub detail: Option<String>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::meta::healthz,
        crate::api::meta::schema_get,
        crate::api::meta::config_get,
        crate::api::meta::userinfo_get,
        crate::api::meta::initialize_put,
        crate::api::annotations::obs_get,
        crate::api::annotations::obs_put,
        crate::api::annotations::var_get,
        crate::api::data::var_get,
        crate::api::data::var_put,
        crate::api::data::summary_get,
        crate::api::data::summary_post,
        crate::api::diffexp::obs_post,
        crate::api::layout::obs_get,
        crate::api::layout::obs_put,
        crate::api::layout::obsm_delete_put,
        crate::api::layout::obsm_rename_put,
        crate::api::layout::reembed_parameters_obsm_put,
        crate::api::compute::sankey_put,
        crate::api::compute::leiden_put,
        crate::api::compute::preprocess_put,
        crate::api::exports::labels_put,
        crate::api::exports::genesets_put,
        crate::api::genesets::genesets_get,
        crate::api::genesets::genesets_put,
        crate::api::genesets::reembed_parameters_get,
        crate::api::genesets::reembed_parameters_put,
    ),
    components(schemas(HealthOk, Problem)),
    tags(
        (name = "Meta", description = "Health, schema and client configuration"),
        (name = "Data", description = "Expression matrix reads and summaries"),
        (name = "Annotations", description = "Observation and variable annotations"),
        (name = "Layout", description = "Embeddings and their lifecycle"),
        (name = "Compute", description = "Engine-backed derived views"),
        (name = "Gene sets", description = "Gene sets and reembedding parameters"),
        (name = "Export", description = "CSV downloads")
    )
)]
pub struct ApiDoc;
