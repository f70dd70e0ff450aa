//! Read-only HTTP view of the watch sessions.
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::ToSocketAddrs;

use crate::session::{WatchHandle, WatchManager};

async fn healthz(manager: State<WatchManager>) -> Response {
    let body = serde_json::json!({
        "status": "ok",
        "sessions": manager.registry().size(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

async fn list_watches(manager: State<WatchManager>) -> Response {
    (StatusCode::OK, Json(manager.statuses())).into_response()
}

async fn get_watch(manager: State<WatchManager>, Path(handle): Path<u64>) -> Response {
    match manager.status(WatchHandle::from_raw(handle)) {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => {
            log::debug!("status lookup failed: {err}");
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

pub fn router(manager: WatchManager) -> axum::Router {
    axum::Router::new()
        .route("/healthz", get(healthz))
        .route("/watches", get(list_watches))
        .route("/watches/{handle}", get(get_watch))
        .with_state(manager)
}

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new(manager: WatchManager) -> Self {
        Self {
            router: router(manager),
        }
    }

    pub async fn listen(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("HTTP API listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router.into_make_service()).await
    }
}
