use std::sync::Arc;

use arrow::array::{ArrayRef, Float32Array};
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use bytes::Bytes;
use cellx_core::dataset::DEFAULT_LAYER;
use cellx_core::util::is_true_literal;
use cellx_core::{FilterError, QueryParams};
use cellx_protocol::{Axis, FilterSpec};
use serde::Deserialize;
use serde_json::Value;
use sha1::{Digest, Sha1};

use super::{blocking, check_column_limit, octet_stream, parse_json, query_params, var_mask};
use crate::negotiate::{self, OCTET_STREAM};
use crate::responses::ApiError;
use crate::AppState;

const DATA_RESERVED: [&str; 2] = ["layer", "logscale"];
const SUMMARY_RESERVED: [&str; 4] = ["method", "key", "layer", "logscale"];
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const SUMMARY_BODY_MAX: usize = 1_000_000;

#[derive(Debug, Deserialize)]
struct DataVarBody {
    #[serde(default)]
    filter: Option<FilterSpec>,
    #[serde(default)]
    layer: Option<String>,
    #[serde(default)]
    logscale: Option<Value>,
}

fn logscale_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => is_true_literal(Some(s.as_str())),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

async fn layer_frame(
    state: &AppState,
    filter: FilterSpec,
    layer: String,
    logscale: bool,
) -> Result<Response, ApiError> {
    if filter.references(Axis::Obs) {
        return Err(FilterError::UnsupportedAxis(Axis::Obs).into());
    }
    let selected = var_mask(state, filter.var.as_ref())?.indices();
    check_column_limit(state, selected.len())?;
    let dataset = state.dataset_handle();
    let bytes = blocking(move || {
        let table = dataset.layer_columns(&layer, &selected, logscale)?;
        Ok(cellx_codec::encode(&table, Axis::Var)?)
    })
    .await?;
    Ok(octet_stream(bytes))
}

/// Layer values for the variables selected by query-string filters.
#[utoipa::path(
    get,
    path = "/api/v0.2/data/var",
    tag = "Data",
    params(
        ("layer" = Option<String>, Query, description = "Layer name, `X` by default"),
        ("logscale" = Option<String>, Query, description = "`true` applies ln(1+x)")
    ),
    responses(
        (status = 200, description = "Frame", content_type = "application/octet-stream"),
        (status = 400, description = "Bad filter, unknown layer or too many columns"),
        (status = 406, description = "Binary response not acceptable")
    )
)]
pub async fn var_get(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    negotiate::require(&headers, OCTET_STREAM)?;
    let params = query_params(raw);
    let layer = params.get("layer").unwrap_or(DEFAULT_LAYER).to_string();
    let logscale = is_true_literal(params.get("logscale"));
    let filter = params.filter(&DATA_RESERVED)?;
    layer_frame(&state, filter, layer, logscale).await
}

/// Layer values for the variables selected by a JSON filter.
#[utoipa::path(
    put,
    path = "/api/v0.2/data/var",
    tag = "Data",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Frame", content_type = "application/octet-stream"),
        (status = 400, description = "Bad filter, unknown layer or too many columns"),
        (status = 406, description = "Binary response not acceptable")
    )
)]
pub async fn var_put(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    negotiate::require(&headers, OCTET_STREAM)?;
    let request: DataVarBody = parse_json(&body)?;
    let logscale = logscale_flag(request.logscale.as_ref());
    layer_frame(
        &state,
        request.filter.unwrap_or_default(),
        request.layer.unwrap_or_else(|| DEFAULT_LAYER.to_string()),
        logscale,
    )
    .await
}

/// Hex SHA-1 of the raw query; names the summary column and guards POSTs.
pub(crate) fn query_hash(raw_query: &[u8]) -> String {
    hex::encode(Sha1::digest(raw_query))
}

fn row_means(table: &arrow::array::RecordBatch) -> Result<Vec<f32>, ApiError> {
    let mut sums = vec![0f32; table.num_rows()];
    for column in table.columns() {
        for (sum, value) in sums.iter_mut().zip(cellx_codec::float32_values(column.as_ref())?) {
            *sum += value;
        }
    }
    let n = table.num_columns();
    if n > 0 {
        for sum in &mut sums {
            *sum /= n as f32;
        }
    }
    Ok(sums)
}

async fn summarize(
    state: &AppState,
    headers: &HeaderMap,
    params: QueryParams,
    key: Option<&str>,
    raw_query: &[u8],
) -> Result<Response, ApiError> {
    negotiate::require(headers, OCTET_STREAM)?;
    let method = params.get("method").unwrap_or("mean");
    let hash = query_hash(raw_query);
    if key.is_some_and(|k| k != hash) {
        return Err(ApiError::bad_request("query key did not match"));
    }
    let filter = params.filter(&SUMMARY_RESERVED)?;
    if method != "mean" {
        return Err(ApiError::bad_request(format!(
            "unsupported summary method '{method}'"
        )));
    }
    if filter.references(Axis::Obs) {
        return Err(FilterError::UnsupportedAxis(Axis::Obs).into());
    }
    let layer = params.get("layer").unwrap_or(DEFAULT_LAYER).to_string();
    let logscale = is_true_literal(params.get("logscale"));
    let selected = var_mask(state, filter.var.as_ref())
        .map_err(|e| ApiError::NotFound(e.to_string()))?
        .indices();

    let dataset = state.dataset_handle();
    let bytes = blocking(move || {
        let table = dataset
            .layer_columns(&layer, &selected, logscale)
            .map_err(|e| ApiError::NotFound(e.to_string()))?;
        let means = row_means(&table)?;
        let summary = cellx_codec::table(
            vec![(hash, Arc::new(Float32Array::from(means)) as ArrayRef)],
            table.num_rows(),
        )?;
        Ok(cellx_codec::encode(&summary, Axis::Obs)?)
    })
    .await?;
    Ok(octet_stream(bytes))
}

/// Mean expression of the selected variables per observation.
#[utoipa::path(
    get,
    path = "/api/v0.2/summary/var",
    tag = "Data",
    params(("method" = Option<String>, Query, description = "Only `mean` is supported")),
    responses(
        (status = 200, description = "Single-column frame named by the query hash", content_type = "application/octet-stream"),
        (status = 400, description = "Bad filter or method"),
        (status = 404, description = "Unknown field or layer")
    )
)]
pub async fn summary_get(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let raw = raw.unwrap_or_default();
    let params = QueryParams::parse(&raw);
    summarize(&state, &headers, params, None, raw.as_bytes()).await
}

/// Form-encoded variant of the summary for filters too long for a URL.
#[utoipa::path(
    post,
    path = "/api/v0.2/summary/var",
    tag = "Data",
    params(("key" = Option<String>, Query, description = "SHA-1 of the form body")),
    request_body(content = String, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Single-column frame named by the query hash", content_type = "application/octet-stream"),
        (status = 400, description = "Bad filter, method, key or oversized body"),
        (status = 415, description = "Body is not form-encoded")
    )
)]
pub async fn summary_post(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let form_encoded = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(FORM_CONTENT_TYPE));
    if !form_encoded {
        return Err(ApiError::UnsupportedMediaType(format!(
            "expected {FORM_CONTENT_TYPE}"
        )));
    }
    if body.len() > SUMMARY_BODY_MAX {
        return Err(ApiError::bad_request("request body too large"));
    }
    let query = query_params(raw);
    let key = query.get("key").map(str::to_string);
    let mut params = query;
    params.extend(QueryParams::parse(&String::from_utf8_lossy(&body)));
    summarize(&state, &headers, params, key.as_deref(), &body).await
}
