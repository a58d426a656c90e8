use arrow::array::ArrayRef;
use axum::extract::{RawQuery, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use cellx_protocol::Axis;
use serde_json::{json, Value};

use super::{check_column_limit, collection, label_source, octet_stream, query_params};
use crate::negotiate::{self, OCTET_STREAM};
use crate::responses::ApiError;
use crate::scope::Scope;
use crate::{schema, AppState};

const NAME_PARAM: &str = "annotation-name";

fn find_column(tables: &[&arrow::array::RecordBatch], name: &str) -> Option<ArrayRef> {
    tables.iter().find_map(|table| table.column_by_name(name).cloned())
}

/// Obs annotation columns as a binary frame.
#[utoipa::path(
    get,
    path = "/api/v0.2/annotations/obs",
    tag = "Annotations",
    params(("annotation-name" = Option<Vec<String>>, Query, description = "Columns to return; all when omitted")),
    responses(
        (status = 200, description = "Frame", content_type = "application/octet-stream"),
        (status = 400, description = "Unknown column or too many columns"),
        (status = 406, description = "Binary response not acceptable")
    )
)]
pub async fn obs_get(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let params = query_params(raw);
    let labels = schema::user_labels(&state, &scope).await?;
    let mut fields = params.get_all(NAME_PARAM);
    if fields.is_empty() {
        fields = schema::obs_columns(&state, labels.as_ref())
            .into_iter()
            .map(|c| c.name)
            .collect();
    }
    check_column_limit(&state, fields.len())?;
    negotiate::require(&headers, OCTET_STREAM)?;

    let n_obs = state.dataset().shape().0;
    let sources: Vec<_> = label_source(&state, labels.as_ref())
        .into_iter()
        .chain(std::iter::once(state.dataset().obs()))
        .collect();
    let mut columns = Vec::with_capacity(fields.len());
    for name in fields {
        let column = find_column(&sources, &name)
            .ok_or_else(|| ApiError::bad_request(format!("unknown obs annotation '{name}'")))?;
        columns.push((name, column));
    }
    let table = cellx_codec::table(columns, n_obs)?;
    Ok(octet_stream(cellx_codec::encode(&table, Axis::Obs)?))
}

/// Replace the caller's obs labels with a zlib-compressed frame.
#[utoipa::path(
    put,
    path = "/api/v0.2/annotations/obs",
    tag = "Annotations",
    params(("annotation-collection-name" = Option<String>, Query, description = "Label collection")),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Stored", body = serde_json::Value),
        (status = 400, description = "Malformed frame or invalid labels"),
        (status = 501, description = "User annotations disabled")
    )
)]
pub async fn obs_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    RawQuery(raw): RawQuery,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    if !state.config().features.user_annotations {
        return Err(ApiError::FeatureDisabled("writable annotations"));
    }
    let params = query_params(raw);
    let collection = collection(&params)?;
    let frame = cellx_codec::decode_compressed(&body)
        .map_err(|e| ApiError::bad_request(format!("malformed label frame: {e}")))?;
    if frame.axis == Some(Axis::Var) {
        return Err(ApiError::bad_request("label frames must describe the obs axis"));
    }
    state
        .store()
        .write_labels(&scope, &frame.table, state.dataset().shape().0)
        .await?;
    tracing::info!(
        user = %scope,
        collection = collection.as_ref().map(|c| c.as_str()),
        columns = frame.table.num_columns(),
        "labels written"
    );
    Ok(Json(json!({"status": "OK"})))
}

/// Var annotation columns as a binary frame.
#[utoipa::path(
    get,
    path = "/api/v0.2/annotations/var",
    tag = "Annotations",
    params(("annotation-name" = Option<Vec<String>>, Query, description = "Columns to return; all when omitted")),
    responses(
        (status = 200, description = "Frame", content_type = "application/octet-stream"),
        (status = 400, description = "Unknown column or too many columns"),
        (status = 406, description = "Binary response not acceptable")
    )
)]
pub async fn var_get(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let params = query_params(raw);
    let var = state.dataset().var();
    let mut fields = params.get_all(NAME_PARAM);
    if fields.is_empty() {
        fields = var.schema().fields().iter().map(|f| f.name().clone()).collect();
    }
    check_column_limit(&state, fields.len())?;
    negotiate::require(&headers, OCTET_STREAM)?;

    let names: Vec<&str> = fields.iter().map(String::as_str).collect();
    let table = cellx_codec::project(var, &names).map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(octet_stream(cellx_codec::encode(&table, Axis::Var)?))
}
