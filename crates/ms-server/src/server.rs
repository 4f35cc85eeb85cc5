//! HTTP dispatcher
//!
//! `GET /` reports readiness; `POST /` takes a resample body, waits for a
//! worker permit, and runs the render on the blocking pool. Compute stays
//! synchronous inside a permit; only I/O and dispatch are async.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::Semaphore;

use ms_core::{CancelToken, RenderRequest};
use ms_render::{RenderError, Renderer};

use crate::request::ResampleRequest;

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    renderer: Arc<Renderer>,
    permits: Arc<Semaphore>,
    ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(renderer: Arc<Renderer>, max_workers: usize, ready: Arc<AtomicBool>) -> Self {
        Self {
            renderer,
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            ready,
        }
    }
}

/// Build the router serving the resample RPC.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status).post(render))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn run_server(state: AppState, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on http://{addr}");
    axum::serve(listener, router(state)).await
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    if state.ready.load(Ordering::Acquire) {
        (StatusCode::OK, "Server Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Server Initializing")
    }
}

async fn render(
    State(state): State<AppState>,
    Json(rpc): Json<ResampleRequest>,
) -> impl IntoResponse {
    if !state.ready.load(Ordering::Acquire) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Server Initializing".to_string(),
        );
    }

    let req: RenderRequest = rpc.into();
    let success = success_message(&req);

    let permit = match state.permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "worker pool closed".to_string(),
            )
        }
    };

    let renderer = Arc::clone(&state.renderer);
    let cancel = CancelToken::new();
    let result = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        renderer.render(&req, &cancel)
    })
    .await;

    match result {
        Ok(Ok(_stats)) => (StatusCode::OK, success),
        Ok(Err(e)) => error_response(e),
        Err(join_err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("render worker panicked: {join_err}"),
        ),
    }
}

fn success_message(req: &RenderRequest) -> String {
    let stem = req
        .input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("?");
    let out = req
        .output_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("?");
    format!("Success: '{stem}' -> '{out}'")
}

fn error_response(e: RenderError) -> (StatusCode, String) {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match &e {
        RenderError::Ml(_) | RenderError::File(_) | RenderError::Internal(_) => {
            // One-line message plus the debug chain as a traceback
            format!("{e}\n{e:?}")
        }
        _ => e.to_string(),
    };
    log::error!("render failed ({status}): {e}");
    (status, body)
}
