use std::collections::HashSet;

use axum::extract::{RawQuery, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use cellx_protocol::GeneSet;
use serde_json::{json, Map, Value};

use super::{attachment, collection, parse_json, query_params};
use crate::negotiate::{self, CSV, JSON};
use crate::responses::ApiError;
use crate::scope::Scope;
use crate::{schema, AppState};

/// Variable identifiers gene sets may reference; `None` when the dataset
/// has no var index column.
fn known_genes(state: &AppState) -> Result<Option<HashSet<String>>, ApiError> {
    let var = state.dataset().var();
    let Some(column) = schema::var_index_name(state).and_then(|name| var.column_by_name(&name).cloned())
    else {
        return Ok(None);
    };
    Ok(Some(
        cellx_codec::column_strings(column.as_ref())?
            .into_iter()
            .flatten()
            .collect(),
    ))
}

/// Stored gene sets as JSON or CSV, by `Accept`.
#[utoipa::path(
    get,
    path = "/api/v0.2/genesets",
    tag = "Gene sets",
    params(("annotation-collection-name" = Option<String>, Query, description = "Gene set collection")),
    responses(
        (status = 200, description = "`{genesets, tid}` or CSV", body = serde_json::Value),
        (status = 406, description = "Neither JSON nor CSV acceptable")
    )
)]
pub async fn genesets_get(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let preferred = negotiate::best_match(&headers, &[JSON, CSV]).ok_or(ApiError::NotAcceptable)?;
    let params = query_params(raw);
    let collection = collection(&params)?;
    let document = state
        .store()
        .read_gene_sets(&scope, collection.as_ref())
        .await?;
    if preferred == CSV {
        let csv = cellx_store::gene_sets_csv(&document.genesets)?;
        return Ok(attachment(CSV, "genesets.csv", csv.into_bytes()));
    }
    Ok(Json(json!({"genesets": document.genesets, "tid": document.tid})).into_response())
}

/// Replace the caller's gene sets; `tid` must be newer than the stored one.
#[utoipa::path(
    put,
    path = "/api/v0.2/genesets",
    tag = "Gene sets",
    params(("annotation-collection-name" = Option<String>, Query, description = "Gene set collection")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Stored", body = serde_json::Value),
        (status = 400, description = "Missing or invalid gene sets"),
        (status = 404, description = "Obsolete tid"),
        (status = 501, description = "Gene set saving disabled")
    )
)]
pub async fn genesets_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    RawQuery(raw): RawQuery,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    if !state.config().features.gene_sets_save {
        return Err(ApiError::FeatureDisabled("gene set saving"));
    }
    let params = query_params(raw);
    let collection = collection(&params)?;
    let mut args: Map<String, Value> = parse_json(&body)?;
    let genesets = match args.remove("genesets") {
        None | Some(Value::Null) => return Err(ApiError::bad_request("missing genesets")),
        Some(value) => serde_json::from_value::<Vec<GeneSet>>(value)
            .map_err(|e| ApiError::bad_request(format!("malformed genesets: {e}")))?,
    };
    let tid = args
        .get("tid")
        .and_then(Value::as_u64)
        .filter(|tid| *tid > 0)
        .ok_or_else(|| ApiError::bad_request("tid must be a positive integer"))?;
    let known = known_genes(&state)?;
    let document = state
        .store()
        .write_gene_sets(&scope, collection.as_ref(), genesets, tid, known.as_ref())
        .await?;
    tracing::info!(user = %scope, tid = document.tid, sets = document.genesets.len(), "gene sets saved");
    Ok(Json(json!({"status": "OK"})))
}

/// The caller's saved reembedding parameter document.
#[utoipa::path(
    get,
    path = "/api/v0.2/reembed-parameters",
    tag = "Gene sets",
    params(("annotation-collection-name" = Option<String>, Query, description = "Parameter collection")),
    responses(
        (status = 200, description = "`{reembedParams}`", body = serde_json::Value),
        (status = 406, description = "Neither JSON nor CSV acceptable")
    )
)]
pub async fn reembed_parameters_get(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    negotiate::best_match(&headers, &[JSON, CSV]).ok_or(ApiError::NotAcceptable)?;
    let params = query_params(raw);
    let collection = collection(&params)?;
    let document = state
        .store()
        .read_reembed_document(&scope, collection.as_ref())
        .await?;
    Ok(Json(json!({ "reembedParams": document })))
}

/// Save the caller's reembedding parameter document.
#[utoipa::path(
    put,
    path = "/api/v0.2/reembed-parameters",
    tag = "Gene sets",
    params(("annotation-collection-name" = Option<String>, Query, description = "Parameter collection")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Stored", body = serde_json::Value),
        (status = 400, description = "Missing reembedParams or bad collection name")
    )
)]
pub async fn reembed_parameters_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    RawQuery(raw): RawQuery,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let params = query_params(raw);
    let collection = collection(&params)?;
    let mut args: Map<String, Value> = parse_json(&body)?;
    let document = match args.remove("reembedParams") {
        Some(Value::Object(document)) => document,
        None | Some(Value::Null) => return Err(ApiError::bad_request("missing reembedParams")),
        Some(_) => return Err(ApiError::bad_request("reembedParams must be an object")),
    };
    state
        .store()
        .write_reembed_document(&scope, collection.as_ref(), &document)
        .await?;
    tracing::debug!(user = %scope, keys = document.len(), "reembed parameters saved");
    Ok(Json(json!({"status": "OK"})))
}
