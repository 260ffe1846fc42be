//! HTTP routes.

mod core;
mod streams;

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use md5::{Digest, Md5};

use crate::app::App;
use crate::error::ApiError;

/// Builds the full route table over the shared application state.
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/", get(alive))
        .route("/streams", post(streams::create))
        .route("/streams/info/:stream_id", get(streams::info))
        .route("/streams/activate", post(streams::activate))
        .route("/streams/download/:stream_id/*path", get(streams::download))
        .route("/streams/start/:stream_id", put(streams::start))
        .route("/streams/stop/:stream_id", put(streams::stop))
        .route("/streams/delete/:stream_id", put(streams::delete))
        .route("/streams/sync/:stream_id", get(streams::sync))
        .route("/core/start", get(core::start))
        .route("/core/frame", post(core::frame))
        .route("/core/checkpoint", post(core::checkpoint))
        .route("/core/stop", put(core::stop))
        .route("/core/heartbeat", post(core::heartbeat))
        .with_state(app)
}

/// Liveness probe with a small status payload.
async fn alive(State(app): State<Arc<App>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": app.config.name,
        "streams": app.manager.stream_count(),
        "active_streams": app.manager.active_session_count(),
    }))
}

/// Verifies the Content-MD5 header against the request body and returns
/// the lower-hex digest.
pub(crate) fn verify_content_md5(headers: &HeaderMap, body: &[u8]) -> Result<String, ApiError> {
    let claimed = headers
        .get("content-md5")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing Content-MD5 header".to_owned()))?;
    let digest = hex::encode(Md5::digest(body));
    if digest != claimed {
        return Err(ApiError::BadRequest("Content-MD5 mismatch".to_owned()));
    }
    Ok(digest)
}

/// Converts a JSON file map (name → string payload) to raw bytes.
pub(crate) fn file_bytes(
    files: std::collections::HashMap<String, String>,
) -> std::collections::HashMap<String, Vec<u8>> {
    files
        .into_iter()
        .map(|(name, data)| (name, data.into_bytes()))
        .collect()
}
