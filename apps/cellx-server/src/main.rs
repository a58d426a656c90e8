use std::net::SocketAddr;

use tracing::{error, info};

mod access_log;
mod api;
mod app_state;
mod bootstrap;
mod negotiate;
mod openapi;
mod responses;
mod router;
mod schema;
mod scope;
#[cfg(test)]
mod test_support;

pub(crate) use app_state::AppState;

#[tokio::main]
async fn main() {
    match bootstrap::ensure_openapi_export() {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(err) => {
            eprintln!("error: failed to write generated OPENAPI_OUT: {err}");
            std::process::exit(2);
        }
    }

    cellx_otel::init();
    let config = match cellx_core::resolve_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };
    let http_cfg = match bootstrap::http_config_from_env(&config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };
    let bootstrap::BootstrapOutput { router, state } = match bootstrap::build(config) {
        Ok(output) => output,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    };

    let app = bootstrap::attach_global_layers(bootstrap::attach_http_layers(
        router.with_state::<()>(state),
        http_cfg.concurrency_limit,
    ));

    if let Err(err) = serve(app, http_cfg.addr).await {
        error!("http server exited with error: {err:#}");
        std::process::exit(1);
    }
    info!("server stopped");
}

async fn serve(app: axum::Router<()>, addr: SocketAddr) -> anyhow::Result<()> {
    use anyhow::Context as _;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serve")
}

async fn shutdown_signal() {
    info!("shutdown signal listener active");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}

#[cfg(test)]
#[allow(clippy::items_after_test_module)]
mod http_tests {
    use super::*;
    use crate::{
        negotiate::{CSV, JSON, OCTET_STREAM},
        router::{self, paths},
        test_support::{self, ScriptedEngine},
    };
    use arrow::array::{ArrayRef, AsArray, Float32Array};
    use axum::{
        body::Body,
        http::{header, Request, Response, StatusCode},
        Router,
    };
    use cellx_core::Config;
    use cellx_protocol::Axis;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::{atomic::Ordering, Arc};
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    const ALICE: &str = "alice";

    fn app(state: AppState) -> Router {
        let (router, _) = router::build_router();
        router.with_state(state)
    }

    async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
        app.clone().oneshot(request).await.expect("response")
    }

    fn get(uri: &str, accept: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header("x-cellx-user", ALICE)
            .header(header::ACCEPT, accept)
            .body(Body::empty())
            .expect("request")
    }

    fn put_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri(uri)
            .header("x-cellx-user", ALICE)
            .header(header::CONTENT_TYPE, JSON)
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn bytes(response: Response<Body>) -> bytes::Bytes {
        response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
    }

    async fn json_body(response: Response<Body>) -> Value {
        serde_json::from_slice(&bytes(response).await).expect("json body")
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let response = send(&app, get(paths::HEALTHZ, JSON)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"ok": true}));
    }

    #[tokio::test]
    async fn schema_describes_the_base_dataset() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let response = send(&app, get(paths::SCHEMA, JSON)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let schema = &body["schema"];
        assert_eq!(schema["dataframe"]["nObs"], 6);
        assert_eq!(schema["dataframe"]["nVar"], 4);
        assert_eq!(schema["layers"], json!([".raw", "X", "counts"]));
        let obs: Vec<&str> = schema["annotations"]["obs"]["columns"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(obs, vec!["tissue", "num_reads", "name_0"]);
    }

    #[tokio::test]
    async fn filtered_var_data_returns_selected_columns() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let response = send(
            &app,
            get(
                "/api/v0.2/data/var?var:name_0=CD3E&var:name_0=GNLY",
                OCTET_STREAM,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let frame = cellx_codec::decode(&bytes(response).await).unwrap();
        assert_eq!(frame.axis, Some(Axis::Var));
        assert_eq!(frame.table.num_columns(), 2);
        assert_eq!(frame.table.num_rows(), 6);
        let first: &Float32Array = frame.table.column(0).as_primitive();
        assert_eq!(first.value(1), 4.0);
    }

    #[tokio::test]
    async fn obs_filter_on_var_data_is_rejected() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let response = send(
            &app,
            get("/api/v0.2/data/var?obs:tissue=heart", OCTET_STREAM),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/problem+json"
        );
    }

    #[tokio::test]
    async fn binary_endpoints_require_octet_stream() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let response = send(&app, get(paths::ANNOTATIONS_OBS, JSON)).await;
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn written_labels_are_served_back() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let labels = cellx_codec::table(
            vec![(
                "cluster".into(),
                cellx_codec::categorical_array(["a", "b", "a", "b", "a", "b"].map(Some)),
            )],
            6,
        )
        .unwrap();
        let encoded = cellx_codec::encode(&labels, Axis::Obs).unwrap();
        let body = cellx_codec::deflate(&encoded).unwrap();
        let request = Request::builder()
            .method("PUT")
            .uri(paths::ANNOTATIONS_OBS)
            .header("x-cellx-user", ALICE)
            .header(header::CONTENT_TYPE, OCTET_STREAM)
            .body(Body::from(body))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            get("/api/v0.2/annotations/obs?annotation-name=cluster", OCTET_STREAM),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let frame = cellx_codec::decode(&bytes(response).await).unwrap();
        assert_eq!(frame.table, labels);

        let schema = json_body(send(&app, get(paths::SCHEMA, JSON)).await).await;
        let names: Vec<&str> = schema["schema"]["annotations"]["obs"]["columns"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["cluster", "name_0"]);
    }

    #[tokio::test]
    async fn garbage_label_frame_is_a_bad_request() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let request = Request::builder()
            .method("PUT")
            .uri(paths::ANNOTATIONS_OBS)
            .header(header::CONTENT_TYPE, OCTET_STREAM)
            .body(Body::from(vec![1u8, 2, 3]))
            .unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn diffexp_var_filter_is_rejected_before_the_engine_runs() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::default());
        let app = app(test_support::state_with(
            dir.path(),
            Config::default(),
            engine.clone(),
        ));
        let request = Request::builder()
            .method("POST")
            .uri(paths::DIFFEXP_OBS)
            .header(header::CONTENT_TYPE, JSON)
            .body(Body::from(
                json!({
                    "mode": "topN",
                    "count": 5,
                    "set1": {"filter": {"var": {"annotation_value": [{"name": "name_0", "values": ["CD3E"]}]}}},
                    "set2": {"filter": {"obs": {"index": [[0, 3]]}}},
                })
                .to_string(),
            ))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(engine.diffexp_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn diffexp_compares_two_index_sets() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::default());
        let app = app(test_support::state_with(
            dir.path(),
            Config::default(),
            engine.clone(),
        ));
        let request = Request::builder()
            .method("POST")
            .uri(paths::DIFFEXP_OBS)
            .header(header::CONTENT_TYPE, JSON)
            .body(Body::from(
                json!({
                    "mode": "topN",
                    "count": 5,
                    "set1": {"filter": {"obs": {"index": [[0, 4]]}}},
                    "set2": {"filter": {"obs": {"index": [5]}}},
                })
                .to_string(),
            ))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["positive"].as_array().unwrap().len(), 2);
        assert_eq!(body["positive"][0][1], json!(3.0));
        assert_eq!(engine.diffexp_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn summary_post_requires_form_encoding() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let request = Request::builder()
            .method("POST")
            .uri(paths::SUMMARY_VAR)
            .header(header::ACCEPT, OCTET_STREAM)
            .header(header::CONTENT_TYPE, JSON)
            .body(Body::from("{}"))
            .unwrap();
        assert_eq!(
            send(&app, request).await.status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[tokio::test]
    async fn summary_get_averages_the_selected_genes() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let response = send(
            &app,
            get(
                "/api/v0.2/summary/var?var:name_0=CD3E&var:name_0=MS4A1",
                OCTET_STREAM,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let frame = cellx_codec::decode(&bytes(response).await).unwrap();
        assert_eq!(frame.table.num_columns(), 1);
        let means: &Float32Array = frame.table.column(0).as_primitive();
        // cell c has values 4c and 4c + 1
        assert_eq!(means.value(0), 0.5);
        assert_eq!(means.value(2), 8.5);
    }

    #[tokio::test]
    async fn stale_gene_set_tid_is_not_found() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let body = json!({
            "tid": 3,
            "genesets": [{"name": "T cells", "description": "", "genes": ["CD3E", "NOT_A_GENE"]}],
        });
        let first = send(&app, put_json(paths::GENESETS, body.clone())).await;
        assert_eq!(first.status(), StatusCode::OK);
        let second = send(&app, put_json(paths::GENESETS, body)).await;
        assert_eq!(second.status(), StatusCode::NOT_FOUND);

        let stored = json_body(send(&app, get(paths::GENESETS, JSON)).await).await;
        assert_eq!(stored["tid"], 3);
        assert_eq!(stored["genesets"][0]["genes"], json!(["CD3E"]));

        let csv = send(&app, get(paths::GENESETS, CSV)).await;
        assert_eq!(csv.status(), StatusCode::OK);
        assert_eq!(
            csv.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=genesets.csv"
        );
    }

    #[tokio::test]
    async fn unsafe_collection_names_are_rejected() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let response = send(
            &app,
            get(
                "/api/v0.2/reembed-parameters?annotation-collection-name=..%2Fetc",
                JSON,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reembed_parameter_document_round_trips() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let empty = json_body(send(&app, get(paths::REEMBED_PARAMETERS, JSON)).await).await;
        assert_eq!(empty, json!({"reembedParams": {}}));
        let stored = send(
            &app,
            put_json(
                paths::REEMBED_PARAMETERS,
                json!({"reembedParams": {"doPreprocess": true}}),
            ),
        )
        .await;
        assert_eq!(stored.status(), StatusCode::OK);
        let back = json_body(send(&app, get(paths::REEMBED_PARAMETERS, JSON)).await).await;
        assert_eq!(back, json!({"reembedParams": {"doPreprocess": true}}));
    }

    #[tokio::test]
    async fn rename_of_missing_embedding_is_not_found_but_delete_is_ok() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let rename = send(
            &app,
            put_json(
                paths::LAYOUT_OBSM_RENAME,
                json!({"embNames": ["ghost"], "oldName": "ghost", "newName": "spirit"}),
            ),
        )
        .await;
        assert_eq!(rename.status(), StatusCode::NOT_FOUND);

        let delete = send(
            &app,
            put_json(paths::LAYOUT_OBSM_DELETE, json!({"embNames": ["ghost"]})),
        )
        .await;
        assert_eq!(delete.status(), StatusCode::OK);
        assert_eq!(json_body(delete).await, json!({"fail": false}));
    }

    #[tokio::test]
    async fn computed_layout_is_stored_and_served() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let init = send(&app, put_json(paths::INITIALIZE, json!({}))).await;
        assert_eq!(init.status(), StatusCode::OK);

        let computed = send(
            &app,
            put_json(
                paths::LAYOUT_OBS,
                json!({
                    "filter": {"obs": {"index": [[0, 3]]}},
                    "method": "umap",
                    "parentName": "umap",
                    "embName": "zoom",
                }),
            ),
        )
        .await;
        assert_eq!(computed.status(), StatusCode::OK);
        let body = json_body(computed).await;
        assert_eq!(body["layoutSchema"]["name"], "umap;;zoom");
        let layouts: Vec<&str> = body["schema"]["layout"]["obs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["name"].as_str().unwrap())
            .collect();
        assert_eq!(layouts, vec!["umap", "umap;;zoom"]);

        let params = json_body(
            send(
                &app,
                put_json(paths::REEMBED_PARAMETERS_OBSM, json!({"embName": "umap;;zoom"})),
            )
            .await,
        )
        .await;
        assert_eq!(params["reembedParams"]["method"], "umap");
        assert!(params["reembedParams"].get("sample_ids").is_none());
        assert!(params["reembedParams"].get("parentParams").is_none());

        let frame = send(
            &app,
            get("/api/v0.2/layout/obs?layout-name=umap%3B%3Bzoom", OCTET_STREAM),
        )
        .await;
        assert_eq!(frame.status(), StatusCode::OK);
        let frame = cellx_codec::decode(&bytes(frame).await).unwrap();
        let names: Vec<String> = frame
            .table
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["umap;;zoom_0", "umap;;zoom_1"]);
        let x: &ArrayRef = frame.table.column(0);
        assert!(x.as_primitive::<arrow::datatypes::Float32Type>().value(5).is_nan());
    }

    #[tokio::test]
    async fn layout_without_embeddings_is_not_implemented() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let response = send(&app, get(paths::LAYOUT_OBS, OCTET_STREAM)).await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn label_export_leaves_no_file_behind() {
        let dir = tempdir().unwrap();
        let state = test_support::state(dir.path());
        let app = app(state.clone());
        let response = send(
            &app,
            put_json(
                paths::OUTPUT,
                json!({
                    "labelNames": ["tissue"],
                    "filter": {"obs": {"annotation_value": [{"name": "tissue", "values": ["lung"]}]}},
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment; filename="));
        let text = String::from_utf8(bytes(response).await.to_vec()).unwrap();
        assert_eq!(text, "index,tissue\nc1,lung\nc4,lung\n");

        let scope = cellx_core::UserScope::derive(ALICE, "pbmc-mini");
        let output = state.store().scope_dir(&scope).join("output");
        let leftovers = std::fs::read_dir(&output)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn disabled_annotations_report_not_implemented() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.features.user_annotations = false;
        let app = app(test_support::state_with(
            dir.path(),
            config,
            Arc::new(ScriptedEngine::default()),
        ));
        let request = Request::builder()
            .method("PUT")
            .uri(paths::ANNOTATIONS_OBS)
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn leiden_rejects_invalid_resolution() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        send(&app, put_json(paths::INITIALIZE, json!({}))).await;
        let response = send(
            &app,
            put_json(
                paths::LEIDEN,
                json!({"name": "umap", "cName": "leiden", "resolution": 0.0, "filter": {}}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn leiden_assigns_a_label_to_every_observation() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        send(&app, put_json(paths::INITIALIZE, json!({}))).await;
        let response = send(
            &app,
            put_json(
                paths::LEIDEN,
                json!({
                    "name": "umap",
                    "cName": "leiden",
                    "filter": {"obs": {"index": [[0, 4]]}},
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(
            body["clusters"],
            json!(["0", "1", "0", "1", "unassigned", "unassigned"])
        );
    }

    #[tokio::test]
    async fn leiden_on_unknown_layout_is_a_bad_request() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let response = send(
            &app,
            put_json(paths::LEIDEN, json!({"name": "nope", "filter": {}})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sankey_without_labels_skips_the_engine() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::default());
        let app = app(test_support::state_with(
            dir.path(),
            Config::default(),
            engine.clone(),
        ));
        let response = send(&app, put_json(paths::SANKEY, json!({"labels": []}))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"edges": [], "weights": []}));
        assert_eq!(engine.sankey_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sankey_label_sets_must_cover_every_observation() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::default());
        let app = app(test_support::state_with(
            dir.path(),
            Config::default(),
            engine.clone(),
        ));
        let response = send(
            &app,
            put_json(
                paths::SANKEY,
                json!({"labels": [["a", "b", "a", "b", "a", "b"], ["x", "y"]]}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(engine.sankey_calls.load(Ordering::SeqCst), 0);

        let response = send(
            &app,
            put_json(
                paths::SANKEY,
                json!({"labels": [["a", "a", "a", "b", "b", "b"], [1, 1, 2, 2, 2, 2]]}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["edges"][0], json!(["0_a", "1_1"]));
        assert_eq!(body["weights"], json!([2.0, 1.0, 3.0]));
        assert_eq!(engine.sankey_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preprocess_requires_a_filter() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::default());
        let app = app(test_support::state_with(
            dir.path(),
            Config::default(),
            engine.clone(),
        ));
        let response = send(
            &app,
            put_json(paths::PREPROCESS, json!({"params": {"doPreprocess": true}})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(engine.preprocess_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rowless_label_write_keeps_schema_and_reads_in_step() {
        let dir = tempdir().unwrap();
        let app = app(test_support::state(dir.path()));
        let labels = cellx_codec::table(
            vec![(
                "cluster".into(),
                cellx_codec::categorical_array(std::iter::empty::<Option<&str>>()),
            )],
            0,
        )
        .unwrap();
        let encoded = cellx_codec::encode(&labels, Axis::Obs).unwrap();
        let request = Request::builder()
            .method("PUT")
            .uri(paths::ANNOTATIONS_OBS)
            .header("x-cellx-user", ALICE)
            .header(header::CONTENT_TYPE, OCTET_STREAM)
            .body(Body::from(cellx_codec::deflate(&encoded).unwrap()))
            .unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::OK);

        let schema = json_body(send(&app, get(paths::SCHEMA, JSON)).await).await;
        let names: Vec<&str> = schema["schema"]["annotations"]["obs"]["columns"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["tissue", "num_reads", "name_0"]);

        let response = send(&app, get(paths::ANNOTATIONS_OBS, OCTET_STREAM)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let frame = cellx_codec::decode(&bytes(response).await).unwrap();
        assert_eq!(frame.table.num_rows(), 6);
        assert_eq!(frame.table.num_columns(), 3);
    }
}
