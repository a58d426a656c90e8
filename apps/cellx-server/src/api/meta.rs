use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::responses::ApiError;
use crate::scope::Scope;
use crate::{schema, AppState};

/// Health probe.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Meta",
    responses(
        (status = 200, description = "Service healthy", body = crate::openapi::HealthOk)
    )
)]
pub async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

/// Dataset schema merged with the caller's stored state.
#[utoipa::path(
    get,
    path = "/api/v0.2/schema",
    tag = "Meta",
    responses((status = 200, description = "Schema document", body = serde_json::Value))
)]
pub async fn schema_get(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
) -> Result<Json<Value>, ApiError> {
    let doc = schema::build(&state, &scope).await?;
    Ok(Json(json!({ "schema": doc })))
}

fn client_config(state: &AppState) -> Value {
    let cfg = state.config();
    let features = &cfg.features;
    let dataset_title = cfg
        .dataset
        .title
        .clone()
        .unwrap_or_else(|| state.dataset().name().to_string());
    json!({
        "config": {
            "features": [
                {"method": "POST", "path": "/diffexp/obs", "available": features.diffexp},
                {"method": "PUT", "path": "/annotations/obs", "available": features.user_annotations},
                {"method": "PUT", "path": "/genesets", "available": features.gene_sets_save},
                {"method": "PUT", "path": "/layout/obs", "available": true},
                {"method": "PUT", "path": "/leiden", "available": true},
            ],
            "displayNames": {
                "dataset": dataset_title,
                "engine": concat!("cellx-server ", env!("CARGO_PKG_VERSION")),
            },
            "parameters": {
                "obs_names": schema::obs_index_name(state),
                "var_names": schema::var_index_name(state),
                "layers": schema::layer_names(state),
                "disable-diffexp": !features.diffexp,
                "annotations": features.user_annotations,
                "annotations_genesets": true,
                "annotations_genesets_readonly": !features.gene_sets_save,
                "user_annotation_collection_name_enabled": true,
            },
            "limits": {
                "column_request_max": cfg.limits.column_request_max,
                "diffexp_cellcount_max": cfg.limits.diffexp_cellcount_max,
            },
        }
    })
}

/// Client-visible configuration.
#[utoipa::path(
    get,
    path = "/api/v0.2/config",
    tag = "Meta",
    responses((status = 200, description = "Client configuration", body = serde_json::Value))
)]
pub async fn config_get(State(state): State<AppState>) -> impl IntoResponse {
    Json(client_config(&state))
}

/// Who the server thinks the caller is.
#[utoipa::path(
    get,
    path = "/api/v0.2/userinfo",
    tag = "Meta",
    responses((status = 200, description = "User info", body = serde_json::Value))
)]
pub async fn userinfo_get(
    State(state): State<AppState>,
    Scope { scope, identified }: Scope,
) -> impl IntoResponse {
    let features = &state.config().features;
    Json(json!({
        "userinfo": {
            "is_authenticated": identified,
            "user_id": scope.as_str(),
            "is_user_annotations_enabled": features.user_annotations,
            "is_user_genesets_enabled": features.gene_sets_save,
        }
    }))
}

/// Create the caller's storage scope and seed it with the dataset layouts.
#[utoipa::path(
    put,
    path = "/api/v0.2/initialize",
    tag = "Meta",
    responses((status = 200, description = "Scope ready", body = serde_json::Value))
)]
pub async fn initialize_put(
    State(state): State<AppState>,
    Scope { scope, .. }: Scope,
) -> Result<Json<Value>, ApiError> {
    state.store().initialize(&scope, state.dataset()).await?;
    tracing::info!(user = %scope, "user scope initialized");
    Ok(Json(json!({"fail": false})))
}
