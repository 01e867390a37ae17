//! Webhook front-end: a single POST endpoint that cross-seeds one torrent
//! from the input directory by infohash.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::routing::post;
use serde_json::json;
use tokio::net::TcpListener;

use crate::api::GazelleApi;
use crate::injection::Injection;
use crate::metainfo::is_valid_infohash;
use crate::scanner::scan_torrent_file;

pub struct AppState {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub red_api: Arc<GazelleApi>,
    pub ops_api: Arc<GazelleApi>,
    pub injector: Option<Arc<Injection>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/webhook", post(webhook))
        .with_state(state)
}

/// Serve the webhook until interrupted. Blocks the calling thread; the
/// scan work itself runs on the blocking pool.
pub fn run_webserver(
    input_dir: &Path,
    output_dir: &Path,
    red_api: Arc<GazelleApi>,
    ops_api: Arc<GazelleApi>,
    injector: Option<Arc<Injection>>,
    port: u16,
) -> crate::Result<()> {
    let state = Arc::new(AppState {
        input_dir: input_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        red_api,
        ops_api,
        injector,
    });

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        tracing::info!("Webhook server listening on port {port}");

        axum::serve(listener, router(state))
            .with_graceful_shutdown(async {
                tokio::signal::ctrl_c().await.ok();
            })
            .await?;

        Ok(())
    })
}

async fn webhook(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    tracing::info!("Incoming webhook with body: {form:?}");

    let Some(infohash) = form.get("infohash").cloned() else {
        return http_error(
            "Request must include an 'infohash' parameter",
            StatusCode::BAD_REQUEST,
        );
    };
    if !is_valid_infohash(&infohash) {
        return http_error("Invalid infohash", StatusCode::BAD_REQUEST);
    }

    let filepath = state.input_dir.join(format!("{infohash}.torrent"));
    if !filepath.exists() {
        return http_error(
            &format!("No torrent found at {}", filepath.display()),
            StatusCode::NOT_FOUND,
        );
    }

    let worker_state = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        scan_torrent_file(
            &filepath,
            &worker_state.output_dir,
            &worker_state.red_api,
            &worker_state.ops_api,
            worker_state.injector.as_deref(),
        )
    })
    .await;

    let response = match result {
        Ok(Ok(new_filepath)) => {
            http_success(&new_filepath.display().to_string(), StatusCode::CREATED)
        }
        Ok(Err(crate::Error::TorrentAlreadyExists(message))) => {
            http_error(&message, StatusCode::CONFLICT)
        }
        Ok(Err(crate::Error::TorrentNotFound(message))) => {
            http_error(&message, StatusCode::NOT_FOUND)
        }
        Ok(Err(e)) => http_error(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
        Err(e) => http_error(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    };

    tracing::info!("Responding: {} {}", response.0, response.1.0);
    response
}

fn http_success(message: &str, code: StatusCode) -> (StatusCode, axum::Json<serde_json::Value>) {
    (
        code,
        axum::Json(json!({"status": "success", "message": message})),
    )
}

fn http_error(message: &str, code: StatusCode) -> (StatusCode, axum::Json<serde_json::Value>) {
    (
        code,
        axum::Json(json!({"status": "error", "message": message})),
    )
}
