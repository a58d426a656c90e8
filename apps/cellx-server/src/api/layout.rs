use std::sync::Arc;

use arrow::array::{ArrayRef, Float32Array};
use axum::extract::{RawQuery, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use cellx_core::engine::{EmbeddingRequest, ParentEmbedding};
use cellx_protocol::{Axis, FilterSpec, LayoutSchema};
use cellx_store::EmbeddingRecord;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{blocking, check_column_limit, obs_mask, octet_stream, parse_json, query_params};
use crate::negotiate::{self, OCTET_STREAM};
use crate::responses::ApiError;
use crate::scope::Scope;
use crate::{schema, AppState};

const NAME_PARAM: &str = "layout-name";
/// Joins a parent embedding name and a child name.
pub(crate) const LINEAGE_SEPARATOR: &str = ";;";

/// Embedding coordinates as a binary frame with `<name>_0`, `<name>_1`
/// columns per layout.
#[utoipa::path(
    get,
    path = "/api/v0.2/layout/obs",
    tag = "Layout",
    params(("layout-name" = Option<Vec<String>>, Query, description = "Layouts to return; all when omitted")),
    responses(
        (status = 200, description = "Frame", content_type = "application/octet-stream"),
        (status = 400, description = "Unknown layout or too many columns"),
        (status = 406, description = "Binary response not acceptable"),
        (status = 501, description = "No embedding available")
    )
)]
pub async fn obs_get(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let params = query_params(raw);
    let mut names = params.get_all(NAME_PARAM);
    if names.is_empty() {
        names = state.store().list_embeddings(&scope).await?;
    }
    check_column_limit(&state, names.len())?;
    negotiate::require(&headers, OCTET_STREAM)?;
    if names.is_empty() {
        return Err(ApiError::NotImplemented("No embedding available".into()));
    }

    let mut columns: Vec<(String, ArrayRef)> = Vec::with_capacity(names.len() * 2);
    for name in &names {
        let coords = state
            .store()
            .read_coordinates(&scope, name)
            .await?
            .ok_or_else(|| ApiError::bad_request(format!("unknown layout '{name}'")))?;
        let [dim0, dim1] = LayoutSchema::planar(name.as_str()).dims;
        columns.push((dim0, Arc::new(Float32Array::from(coords.x)) as ArrayRef));
        columns.push((dim1, Arc::new(Float32Array::from(coords.y)) as ArrayRef));
    }
    let table = cellx_codec::table(columns, state.dataset().shape().0)?;
    Ok(octet_stream(cellx_codec::encode(&table, Axis::Obs)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputeLayoutBody {
    #[serde(default)]
    filter: Option<FilterSpec>,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(default)]
    parent_name: String,
    #[serde(default)]
    emb_name: Option<String>,
}

fn default_method() -> String {
    "umap".into()
}

/// Store name for a computed embedding before de-duplication.
pub(crate) fn embedding_base_name(parent: &str, emb_name: Option<&str>, method: &str) -> String {
    let child = emb_name.filter(|n| !n.is_empty()).unwrap_or(method);
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}{LINEAGE_SEPARATOR}{child}")
    }
}

/// Compute and store a new embedding over the filtered observations.
#[utoipa::path(
    put,
    path = "/api/v0.2/layout/obs",
    tag = "Layout",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "New layout and updated schema", body = serde_json::Value),
        (status = 400, description = "Missing filter or unknown parent"),
        (status = 501, description = "Engine cannot compute this method")
    )
)]
pub async fn obs_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: ComputeLayoutBody = parse_json(&body)?;
    let filter = request
        .filter
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("obs filter is required"))?;
    let labels = schema::user_labels(&state, &scope).await?;
    let mask = obs_mask(&state, labels.as_ref(), filter.obs.as_ref())?;

    let parent = if request.parent_name.is_empty() {
        None
    } else {
        let record = state
            .store()
            .read_embedding(&scope, &request.parent_name)
            .await?
            .ok_or_else(|| {
                ApiError::bad_request(format!("unknown parent layout '{}'", request.parent_name))
            })?;
        Some(ParentEmbedding {
            name: request.parent_name.clone(),
            coords: record.coords,
            params: record.params,
        })
    };
    let parent_params = parent.as_ref().map(|p| Value::Object(p.params.clone()));
    let base = embedding_base_name(&request.parent_name, request.emb_name.as_deref(), &request.method);
    let sample_ids: Vec<usize> = mask.indices();
    let engine_request = EmbeddingRequest {
        method: request.method,
        obs_mask: mask,
        params: request.params,
        parent,
    };

    let dataset = state.dataset_handle();
    let engine = state.engine_handle();
    let engine_scope = scope.clone();
    let output = blocking(move || {
        Ok(engine.compute_embedding(dataset.as_ref(), &engine_scope, &engine_request)?)
    })
    .await?;
    let n_obs = state.dataset().shape().0;
    if !output.coords.is_consistent() || output.coords.len() != n_obs {
        return Err(ApiError::internal(format!(
            "engine returned {} coordinates for {n_obs} observations",
            output.coords.len()
        )));
    }

    let mut params = output.params;
    if let Some(parent_params) = parent_params {
        params.insert("parentParams".into(), parent_params);
    }
    params.insert("sample_ids".into(), json!(sample_ids));
    let name = state
        .store()
        .write_embedding_unique(
            &scope,
            &base,
            &EmbeddingRecord {
                coords: output.coords,
                graph: output.graph,
                params,
            },
        )
        .await?;
    tracing::info!(user = %scope, embedding = %name, cells = sample_ids.len(), "embedding computed");

    let doc = schema::build(&state, &scope).await?;
    Ok(Json(json!({
        "layoutSchema": LayoutSchema::planar(name),
        "schema": doc,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBody {
    #[serde(default)]
    emb_names: Option<Vec<String>>,
}

/// Delete embeddings with their graph and parameter artifacts. Names that
/// are already gone are ignored.
#[utoipa::path(
    put,
    path = "/api/v0.2/layout/obsm/delete",
    tag = "Layout",
    request_body = serde_json::Value,
    responses((status = 200, description = "Deleted", body = serde_json::Value))
)]
pub async fn obsm_delete_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: DeleteBody = parse_json(&body)?;
    if let Some(names) = request.emb_names {
        let removed = state.store().delete_embeddings(&scope, &names).await?;
        tracing::info!(user = %scope, embeddings = names.len(), removed, "embeddings deleted");
    }
    Ok(Json(json!({"fail": false})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameBody {
    #[serde(default)]
    emb_names: Option<Vec<String>>,
    #[serde(default)]
    old_name: Option<String>,
    #[serde(default)]
    new_name: Option<String>,
}

/// Rename embeddings by substituting `oldName` with `newName`; every
/// artifact of every named embedding must exist.
#[utoipa::path(
    put,
    path = "/api/v0.2/layout/obsm/rename",
    tag = "Layout",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Updated schema", body = serde_json::Value),
        (status = 400, description = "Target name taken"),
        (status = 404, description = "An artifact of a named embedding is missing")
    )
)]
pub async fn obsm_rename_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: RenameBody = parse_json(&body)?;
    if let (Some(names), Some(old), Some(new)) =
        (request.emb_names, request.old_name, request.new_name)
    {
        let renamed = state
            .store()
            .rename_embeddings(&scope, &names, &old, &new)
            .await?;
        tracing::info!(user = %scope, renamed = renamed.len(), from = %old, to = %new, "embeddings renamed");
    }
    let doc = schema::build(&state, &scope).await?;
    Ok(Json(json!({ "schema": doc })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObsmParamsBody {
    emb_name: String,
}

/// Parameters that produced one embedding, without reproduction internals.
#[utoipa::path(
    put,
    path = "/api/v0.2/reembed-parameters-obsm",
    tag = "Layout",
    request_body = serde_json::Value,
    responses((status = 200, description = "`{reembedParams}`; empty when unknown", body = serde_json::Value))
)]
pub async fn reembed_parameters_obsm_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: ObsmParamsBody = parse_json(&body)?;
    let params = state
        .store()
        .read_reembed_params(&scope, &request.emb_name)
        .await?
        .unwrap_or_default();
    Ok(Json(json!({ "reembedParams": params })))
}
