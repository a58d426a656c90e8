//! Merges the base dataset with a user's stored state into the schema
//! document clients render from.

use arrow::array::RecordBatch;
use cellx_core::dataset::{DEFAULT_LAYER, RAW_LAYER};
use cellx_protocol::{
    AnnotationsSchema, AxisAnnotations, ColumnSchema, ColumnType, DataframeSchema, LayoutSchema,
    LayoutSet, SchemaDoc,
};
use cellx_store::{UserScope, RESERVED_LABEL};

use crate::api::label_source;
use crate::responses::ApiError;
use crate::AppState;

pub(crate) fn layer_names(state: &AppState) -> Vec<String> {
    let dataset = state.dataset();
    let mut layers = Vec::new();
    if dataset.has_raw() {
        layers.push(RAW_LAYER.to_string());
    }
    layers.extend(dataset.layers());
    if !layers.iter().any(|l| l == DEFAULT_LAYER) {
        layers.insert(0, DEFAULT_LAYER.to_string());
    }
    layers
}

/// The user's stored labels when annotations are enabled and present.
pub(crate) async fn user_labels(
    state: &AppState,
    scope: &UserScope,
) -> Result<Option<RecordBatch>, ApiError> {
    if !state.config().features.user_annotations {
        return Ok(None);
    }
    Ok(state.store().read_labels(scope).await?)
}

fn columns_of(table: &RecordBatch, skip: Option<&str>) -> Vec<ColumnSchema> {
    let schema = table.schema();
    schema
        .fields()
        .iter()
        .zip(table.columns())
        .filter(|(field, _)| Some(field.name().as_str()) != skip)
        .filter_map(|(field, column)| match cellx_codec::column_type(column.as_ref()) {
            Some(column_type) => Some(ColumnSchema::new(field.name().clone(), column_type)),
            None => {
                tracing::debug!(column = %field.name(), data_type = %field.data_type(), "column omitted from schema");
                None
            }
        })
        .collect()
}

/// Obs columns as listed in the schema: the user's labels when they can
/// serve reads, otherwise the dataset's own, plus the `name_0` identity
/// column.
pub(crate) fn obs_columns(state: &AppState, labels: Option<&RecordBatch>) -> Vec<ColumnSchema> {
    let base = state.dataset().obs();
    let mut columns = match label_source(state, labels) {
        Some(labels) => columns_of(labels, Some(RESERVED_LABEL)),
        None => columns_of(base, Some(RESERVED_LABEL)),
    };
    let identity = base
        .schema()
        .index_of(RESERVED_LABEL)
        .ok()
        .and_then(|i| cellx_codec::column_type(base.column(i).as_ref()))
        .unwrap_or(ColumnType::String);
    columns.push(ColumnSchema::new(RESERVED_LABEL, identity));
    columns
}

pub(crate) fn obs_index_name(state: &AppState) -> Option<String> {
    state
        .config()
        .dataset
        .obs_names
        .clone()
        .or_else(|| state.dataset().obs_index().map(str::to_string))
}

pub(crate) fn var_index_name(state: &AppState) -> Option<String> {
    state
        .config()
        .dataset
        .var_names
        .clone()
        .or_else(|| state.dataset().var_index().map(str::to_string))
}

pub(crate) async fn build(state: &AppState, scope: &UserScope) -> Result<SchemaDoc, ApiError> {
    let dataset = state.dataset();
    let (n_obs, n_var) = dataset.shape();
    let labels = user_labels(state, scope).await?;
    let layouts = state
        .store()
        .list_embeddings(scope)
        .await?
        .into_iter()
        .map(LayoutSchema::planar)
        .collect();
    Ok(SchemaDoc {
        dataframe: DataframeSchema {
            n_obs,
            n_var,
            r#type: dataset.x_dtype(),
        },
        annotations: AnnotationsSchema {
            obs: AxisAnnotations {
                index: obs_index_name(state),
                columns: obs_columns(state, labels.as_ref()),
            },
            var: AxisAnnotations {
                index: var_index_name(state),
                columns: columns_of(dataset.var(), None),
            },
        },
        layout: LayoutSet { obs: layouts },
        layers: layer_names(state),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn layers_list_raw_first_and_always_x() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path());
        assert_eq!(layer_names(&state), vec![".raw", "X", "counts"]);
    }

    #[tokio::test]
    async fn base_schema_lists_dataset_columns_and_seeded_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path());
        let scope = UserScope::derive("alice", "pbmc-mini");
        state
            .store()
            .initialize(&scope, state.dataset())
            .await
            .unwrap();

        let doc = build(&state, &scope).await.unwrap();
        assert_eq!(doc.dataframe.n_obs, 6);
        assert_eq!(doc.dataframe.n_var, 4);
        let obs: Vec<_> = doc.annotations.obs.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(obs, vec!["tissue", "num_reads", "name_0"]);
        assert!(doc.annotations.obs.columns[0].writable);
        assert!(!doc.annotations.obs.columns[1].writable);
        assert_eq!(doc.layout.obs, vec![LayoutSchema::planar("umap")]);
        assert_eq!(doc.layout.obs[0].dims, ["umap_0".to_string(), "umap_1".to_string()]);
    }

    #[tokio::test]
    async fn stored_labels_replace_dataset_columns() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path());
        let scope = UserScope::derive("alice", "pbmc-mini");
        let labels = cellx_codec::table(
            vec![(
                "my_clusters".into(),
                cellx_codec::categorical_array(["a", "b", "a", "b", "a", "b"].map(Some)),
            )],
            6,
        )
        .unwrap();
        state.store().write_labels(&scope, &labels, 6).await.unwrap();

        let doc = build(&state, &scope).await.unwrap();
        let obs: Vec<_> = doc.annotations.obs.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(obs, vec!["my_clusters", "name_0"]);
        assert_eq!(
            doc.annotations.obs.columns[1].column_type,
            ColumnType::String
        );
    }

    #[tokio::test]
    async fn rowless_labels_fall_back_to_dataset_columns() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path());
        let scope = UserScope::derive("alice", "pbmc-mini");
        let labels = cellx_codec::table(
            vec![(
                "cluster".into(),
                cellx_codec::categorical_array(std::iter::empty::<Option<&str>>()),
            )],
            0,
        )
        .unwrap();
        state.store().write_labels(&scope, &labels, 6).await.unwrap();

        let doc = build(&state, &scope).await.unwrap();
        let obs: Vec<_> = doc.annotations.obs.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(obs, vec!["tissue", "num_reads", "name_0"]);
    }
}
