pub(crate) mod annotations;
pub(crate) mod compute;
pub(crate) mod data;
pub(crate) mod diffexp;
pub(crate) mod exports;
pub(crate) mod genesets;
pub(crate) mod layout;
pub(crate) mod meta;

use arrow::array::RecordBatch;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use cellx_core::{mask, Mask, QueryParams};
use cellx_protocol::AxisFilter;
use cellx_store::CollectionName;
use serde::de::DeserializeOwned;

use crate::negotiate;
use crate::responses::ApiError;
use crate::AppState;

pub(crate) const COLLECTION_PARAM: &str = "annotation-collection-name";

pub(crate) fn query_params(raw: Option<String>) -> QueryParams {
    raw.as_deref().map(QueryParams::parse).unwrap_or_default()
}

pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("a JSON request body is required"));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("malformed request: {e}")))
}

pub(crate) fn collection(params: &QueryParams) -> Result<Option<CollectionName>, ApiError> {
    CollectionName::parse_optional(params.get(COLLECTION_PARAM)).map_err(ApiError::from)
}

pub(crate) fn check_column_limit(state: &AppState, requested: usize) -> Result<(), ApiError> {
    let limits = &state.config().limits;
    if limits.exceeds_column_limit(requested) {
        return Err(ApiError::bad_request(format!(
            "requested {requested} columns, the limit is {}",
            limits.column_request_max
        )));
    }
    Ok(())
}

/// Run CPU-bound work off the async runtime.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(ApiError::internal)?
}

/// Stored labels usable as a column source; an empty label table written
/// without rows contributes nothing.
pub(crate) fn label_source<'a>(
    state: &AppState,
    labels: Option<&'a RecordBatch>,
) -> Option<&'a RecordBatch> {
    labels.filter(|t| t.num_rows() == state.dataset().shape().0)
}

/// Observation mask for an obs filter, resolving fields in the user's labels
/// first and then in the dataset's own obs columns.
pub(crate) fn obs_mask(
    state: &AppState,
    labels: Option<&RecordBatch>,
    filter: Option<&AxisFilter>,
) -> Result<Mask, ApiError> {
    let base = state.dataset().obs();
    let sources: Vec<&RecordBatch> = label_source(state, labels)
        .into_iter()
        .chain(std::iter::once(base))
        .collect();
    Ok(mask::evaluate_optional(
        filter,
        &sources,
        state.dataset().shape().0,
    )?)
}

pub(crate) fn var_mask(state: &AppState, filter: Option<&AxisFilter>) -> Result<Mask, ApiError> {
    let dataset = state.dataset();
    Ok(mask::evaluate_optional(
        filter,
        &[dataset.var()],
        dataset.shape().1,
    )?)
}

pub(crate) fn octet_stream(bytes: Bytes) -> Response {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(negotiate::OCTET_STREAM),
        )],
        bytes,
    )
        .into_response()
}

pub(crate) fn attachment(content_type: &'static str, file_name: &str, body: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename={file_name}");
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}
