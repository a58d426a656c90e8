use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use cellx_core::engine::{LeidenRequest, SankeyRequest};
use cellx_protocol::{FilterSpec, NeighborGraph, SankeyResult};
use cellx_store::UserScope;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{blocking, obs_mask, parse_json};
use crate::responses::ApiError;
use crate::scope::Scope;
use crate::{schema, AppState};

async fn neighbor_graph(
    state: &AppState,
    scope: &UserScope,
    name: &str,
) -> Result<NeighborGraph, ApiError> {
    state
        .store()
        .read_graph(scope, name)
        .await?
        .ok_or_else(|| ApiError::bad_request(format!("unknown layout '{name}'")))
}

fn label_strings(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct SankeyBody {
    #[serde(default)]
    labels: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    filter: Option<FilterSpec>,
}

/// Flow between label sets over the filtered observations.
#[utoipa::path(
    put,
    path = "/api/v0.2/sankey",
    tag = "Compute",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "`{edges, weights}`", body = serde_json::Value),
        (status = 400, description = "Bad labels or filter"),
        (status = 501, description = "Engine cannot compute this view")
    )
)]
pub async fn sankey_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    body: Bytes,
) -> Result<Json<SankeyResult>, ApiError> {
    let request: SankeyBody = parse_json(&body)?;
    let labels = match request.labels {
        Some(labels) if !labels.is_empty() => labels,
        _ => return Ok(Json(SankeyResult::default())),
    };
    let n_obs = state.dataset().shape().0;
    if let Some(bad) = labels.iter().find(|set| set.len() != n_obs) {
        return Err(ApiError::bad_request(format!(
            "label sets must have {n_obs} entries, got {}",
            bad.len()
        )));
    }
    let graph = match request.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => Some(neighbor_graph(&state, &scope, name).await?),
        None => None,
    };
    let stored = schema::user_labels(&state, &scope).await?;
    let filter = request.filter.unwrap_or_default();
    let mask = obs_mask(&state, stored.as_ref(), filter.obs.as_ref())?;
    let sankey_request = SankeyRequest {
        labels: labels.into_iter().map(label_strings).collect(),
        graph,
        obs_mask: mask,
    };

    let dataset = state.dataset_handle();
    let engine = state.engine_handle();
    let result = blocking(move || Ok(engine.sankey(dataset.as_ref(), &scope, &sankey_request)?)).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeidenBody {
    name: String,
    #[serde(default)]
    c_name: Option<String>,
    #[serde(default = "default_resolution")]
    resolution: f64,
    #[serde(default)]
    filter: Option<FilterSpec>,
}

fn default_resolution() -> f64 {
    1.0
}

/// Graph clustering of the filtered observations on a stored embedding's
/// neighbor graph.
#[utoipa::path(
    put,
    path = "/api/v0.2/leiden",
    tag = "Compute",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "`{clusters}`, one label per observation", body = serde_json::Value),
        (status = 400, description = "Unknown layout or bad filter"),
        (status = 501, description = "Engine cannot cluster")
    )
)]
pub async fn leiden_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: LeidenBody = parse_json(&body)?;
    let graph = neighbor_graph(&state, &scope, &request.name).await?;
    let stored = schema::user_labels(&state, &scope).await?;
    let filter = request.filter.unwrap_or_default();
    let mask = obs_mask(&state, stored.as_ref(), filter.obs.as_ref())?;
    tracing::debug!(
        user = %scope,
        embedding = %request.name,
        cluster_name = request.c_name.as_deref(),
        resolution = request.resolution,
        "clustering requested"
    );
    let leiden_request = LeidenRequest {
        embedding: request.name,
        graph,
        resolution: request.resolution,
        obs_mask: mask,
    };

    let dataset = state.dataset_handle();
    let engine = state.engine_handle();
    let clusters =
        blocking(move || Ok(engine.leiden(dataset.as_ref(), &scope, &leiden_request)?)).await?;
    Ok(Json(json!({ "clusters": clusters })))
}

#[derive(Debug, Deserialize)]
struct PreprocessBody {
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(default)]
    filter: Option<FilterSpec>,
}

/// Run the engine's preprocessing over the filtered observations.
#[utoipa::path(
    put,
    path = "/api/v0.2/preprocess",
    tag = "Compute",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Updated schema", body = serde_json::Value),
        (status = 400, description = "Missing filter"),
        (status = 501, description = "Engine cannot preprocess")
    )
)]
pub async fn preprocess_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: PreprocessBody = parse_json(&body)?;
    let filter = request
        .filter
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("obs filter is required"))?;
    let stored = schema::user_labels(&state, &scope).await?;
    let mask = obs_mask(&state, stored.as_ref(), filter.obs.as_ref())?;

    let dataset = state.dataset_handle();
    let engine = state.engine_handle();
    let engine_scope = scope.clone();
    let params = request.params;
    blocking(move || {
        Ok(engine.preprocess(dataset.as_ref(), &engine_scope, &params, &mask)?)
    })
    .await?;
    tracing::info!(user = %scope, "preprocessing finished");
    let doc = schema::build(&state, &scope).await?;
    Ok(Json(json!(doc)))
}
