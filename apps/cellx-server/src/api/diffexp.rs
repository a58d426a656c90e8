use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use cellx_core::Mask;
use cellx_protocol::{Axis, DiffExpResult, FilterSpec};
use serde_json::{Map, Value};

use super::{blocking, obs_mask, parse_json};
use crate::responses::ApiError;
use crate::scope::Scope;
use crate::{schema, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiffExpMode {
    TopN,
    VarFilter,
}

impl DiffExpMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "topN" => Some(DiffExpMode::TopN),
            "varFilter" => Some(DiffExpMode::VarFilter),
            _ => None,
        }
    }
}

/// The `filter` of one comparison set; an absent set compares everything.
fn set_filter(args: &Map<String, Value>, key: &str) -> Result<Option<FilterSpec>, ApiError> {
    let filter = match args.get(key) {
        None => return Ok(Some(FilterSpec::default())),
        Some(Value::Object(set)) => set.get("filter"),
        Some(_) => return Err(ApiError::bad_request(format!("'{key}' must be an object"))),
    };
    match filter {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ApiError::bad_request(format!("malformed {key} filter: {e}"))),
    }
}

fn check_cell_count(state: &AppState, mask: &Mask) -> Result<(), ApiError> {
    match state.config().limits.diffexp_cellcount_max {
        Some(max) if mask.count() > max => Err(ApiError::bad_request(format!(
            "diffexp set of {} cells exceeds the limit of {max}",
            mask.count()
        ))),
        _ => Ok(()),
    }
}

/// Top-N differentially expressed variables between two observation sets.
#[utoipa::path(
    post,
    path = "/api/v0.2/diffexp/obs",
    tag = "Compute",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Positive and negative rows `[var, logfoldchange, pval, pval_adj]`", body = serde_json::Value),
        (status = 400, description = "Missing parameter, var filter or oversized set"),
        (status = 501, description = "Disabled or varFilter mode")
    )
)]
pub async fn obs_post(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
    body: Bytes,
) -> Result<Json<DiffExpResult>, ApiError> {
    if !state.config().features.diffexp {
        return Err(ApiError::FeatureDisabled("differential expression"));
    }
    let args: Map<String, Value> = parse_json(&body)?;
    let mode = args
        .get("mode")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("missing required parameter 'mode'"))?;
    let mode = DiffExpMode::parse(mode)
        .ok_or_else(|| ApiError::bad_request(format!("unknown diffexp mode '{mode}'")))?;
    if mode == DiffExpMode::VarFilter || args.contains_key("varFilter") {
        return Err(ApiError::NotImplemented("varFilter not enabled".into()));
    }

    let set1 = set_filter(&args, "set1")?;
    let set2 = set_filter(&args, "set2")?;
    let count = args.get("count").filter(|v| !v.is_null());
    let (Some(set1), Some(set2), Some(count)) = (set1, set2, count) else {
        return Err(ApiError::bad_request("missing required parameter"));
    };
    if set1.references(Axis::Var) || set2.references(Axis::Var) {
        return Err(ApiError::bad_request("var axis filter not enabled"));
    }
    let count = count
        .as_u64()
        .ok_or_else(|| ApiError::bad_request("count must be a non-negative integer"))?
        as usize;

    let labels = schema::user_labels(&state, &scope).await?;
    let mask1 = obs_mask(&state, labels.as_ref(), set1.obs.as_ref())?;
    let mask2 = obs_mask(&state, labels.as_ref(), set2.obs.as_ref())?;
    check_cell_count(&state, &mask1)?;
    check_cell_count(&state, &mask2)?;

    let dataset = state.dataset_handle();
    let engine = state.engine_handle();
    let result = blocking(move || {
        Ok(engine.diffexp_top_n(dataset.as_ref(), &mask1, &mask2, count)?)
    })
    .await?;
    if let Some(row) = result.first_non_finite() {
        return Err(ApiError::Encoding(format!(
            "differential expression for variable {} is not finite",
            row.0
        )));
    }
    tracing::debug!(
        user = %scope,
        count,
        positive = result.positive.len(),
        negative = result.negative.len(),
        "diffexp computed"
    );
    Ok(Json(result))
}
