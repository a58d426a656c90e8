use axum::extract::{RawQuery, State};
use axum::response::Response;
use bytes::Bytes;
use cellx_core::mask::select_rows;
use cellx_core::Mask;
use cellx_protocol::FilterSpec;
use cellx_store::ExportFile;
use serde::Deserialize;

use super::{attachment, collection, label_source, obs_mask, parse_json, query_params};
use crate::negotiate::CSV;
use crate::responses::ApiError;
use crate::scope::Scope;
use crate::{schema, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportLabelsBody {
    #[serde(default)]
    label_names: Option<Vec<String>>,
    #[serde(default)]
    filter: Option<FilterSpec>,
}

/// Row identifiers for the selected observations: the obs index column when
/// one is configured, else positions.
fn index_values(state: &AppState, mask: &Mask) -> Result<Vec<String>, ApiError> {
    let obs = state.dataset().obs();
    let column = schema::obs_index_name(state).and_then(|name| obs.column_by_name(&name).cloned());
    let all: Vec<String> = match column {
        Some(column) => cellx_codec::column_strings(column.as_ref())?
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect(),
        None => (0..mask.len()).map(|i| i.to_string()).collect(),
    };
    Ok(mask.indices().into_iter().map(|i| all[i].clone()).collect())
}

/// Send an export and release its file whatever the outcome.
async fn send(export: ExportFile) -> Result<Response, ApiError> {
    let body = export.read().await;
    let file_name = export.file_name().to_string();
    export.close();
    Ok(attachment(CSV, &file_name, body?))
}

/// Selected label columns for the filtered observations as a CSV download.
#[utoipa::path(
    put,
    path = "/api/v0.2/output",
    tag = "Export",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "CSV attachment", content_type = "text/csv"),
        (status = 400, description = "Bad filter or unknown label")
    )
)]
pub async fn labels_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: ExportLabelsBody = parse_json(&body)?;
    let obs_filter = request
        .filter
        .and_then(|f| f.obs)
        .ok_or_else(|| ApiError::bad_request("Error parsing filter"))?;
    let labels = schema::user_labels(&state, &scope).await?;
    let source = label_source(&state, labels.as_ref()).unwrap_or(state.dataset().obs());
    let mask = obs_mask(&state, labels.as_ref(), Some(&obs_filter))?;

    let names: Vec<String> = match request.label_names {
        Some(names) => names,
        None => source
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect(),
    };
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let projected = cellx_codec::project(source, &refs).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let selected = select_rows(&projected, &mask).map_err(ApiError::internal)?;
    let index = index_values(&state, &mask)?;

    let export = state
        .store()
        .export_labels_csv(&scope, index, selected)
        .await?;
    tracing::debug!(user = %scope, rows = mask.count(), columns = names.len(), "labels exported");
    send(export).await
}

/// The caller's gene sets as a CSV download.
#[utoipa::path(
    put,
    path = "/api/v0.2/outputgene",
    tag = "Export",
    params(("annotation-collection-name" = Option<String>, Query, description = "Gene set collection")),
    responses((status = 200, description = "CSV attachment", content_type = "text/csv"))
)]
pub async fn genesets_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    RawQuery(raw): RawQuery,
) -> Result<Response, ApiError> {
    let params = query_params(raw);
    let collection = collection(&params)?;
    let export = state
        .store()
        .export_gene_sets_csv(&scope, collection.as_ref())
        .await?;
    send(export).await
}
