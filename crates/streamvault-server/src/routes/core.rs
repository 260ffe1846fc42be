//! Core-facing work routes, authenticated by activation token.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use streamvault_core::VaultError;

use super::{file_bytes, verify_content_md5};
use crate::app::App;
use crate::auth;
use crate::error::ApiError;

/// Start payload handed to a core picking up its stream.
#[derive(Debug, Serialize)]
pub(crate) struct StartReply {
    stream_id: String,
    target_id: String,
    /// File name → base64 payload; names carry a `.b64` suffix to mark the
    /// transport encoding.
    files: HashMap<String, String>,
    options: serde_json::Value,
}

/// `GET /core/start` — the checkpoint (or seed) files and target options
/// the core needs to begin.
pub(crate) async fn start(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
) -> Result<Json<StartReply>, ApiError> {
    let token = auth::core_token(&headers)?;
    let worker_app = Arc::clone(&app);
    let reply = tokio::task::spawn_blocking(move || {
        worker_app.manager.modify_active_stream(&token, |stream, state| {
            let options = worker_app
                .catalog
                .target_options(stream.target_id())
                .map_err(VaultError::callback)?;
            let files = worker_app
                .store
                .load_start_files(stream.stream_id(), state.frames)
                .map_err(VaultError::callback)?;
            Ok(StartReply {
                stream_id: stream.stream_id().to_owned(),
                target_id: stream.target_id().to_owned(),
                files: files
                    .into_iter()
                    .map(|(name, data)| (format!("{name}.b64"), BASE64.encode(data)))
                    .collect(),
                options,
            })
        })
    })
    .await
    .map_err(|_| ApiError::Internal)??;
    Ok(Json(reply))
}

#[derive(Debug, Deserialize)]
pub(crate) struct FrameMessage {
    files: HashMap<String, String>,
}

/// `POST /core/frame` — append one frame to the stream's buffer.
///
/// The body is MD5-framed; a body identical to the previously accepted
/// frame is rejected and the recorded hash is left unchanged.
pub(crate) async fn frame(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let token = auth::core_token(&headers)?;
    let digest = verify_content_md5(&headers, &body)?;
    let msg: FrameMessage = serde_json::from_slice(&body)
        .map_err(|err| ApiError::BadRequest(format!("could not decode frame body: {err}")))?;

    let worker_app = Arc::clone(&app);
    tokio::task::spawn_blocking(move || {
        worker_app.manager.modify_active_stream(&token, |stream, state| {
            let Some(session) = state.session.as_mut() else {
                return Err(VaultError::BadToken);
            };
            if session.frame_hash.as_deref() == Some(digest.as_str()) {
                return Err(VaultError::DuplicateFrame);
            }
            let files = file_bytes(msg.files);
            worker_app
                .store
                .append_frame(stream.stream_id(), &files)
                .map_err(VaultError::callback)?;
            session.frame_hash = Some(digest);
            session.buffer_frames += 1;
            Ok(())
        })
    })
    .await
    .map_err(|_| ApiError::Internal)??;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckpointMessage {
    files: HashMap<String, String>,
    frames: f64,
}

/// `POST /core/checkpoint` — commit buffered frames into a numbered
/// partition together with the core's restart snapshot.
pub(crate) async fn checkpoint(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let token = auth::core_token(&headers)?;
    verify_content_md5(&headers, &body)?;
    let msg: CheckpointMessage = serde_json::from_slice(&body)
        .map_err(|err| ApiError::BadRequest(format!("could not decode checkpoint body: {err}")))?;

    let worker_app = Arc::clone(&app);
    tokio::task::spawn_blocking(move || {
        worker_app.manager.modify_active_stream(&token, |stream, state| {
            let buffer_frames = match &state.session {
                Some(session) => session.buffer_frames,
                None => return Err(VaultError::BadToken),
            };
            let files = file_bytes(msg.files);
            let total = worker_app
                .store
                .commit_checkpoint(stream.stream_id(), &files, state.frames, buffer_frames)
                .map_err(VaultError::callback)?;
            state.frames = total;
            if let Some(session) = state.session.as_mut() {
                session.donor_frames += msg.frames;
                session.buffer_frames = 0;
            }
            Ok(())
        })
    })
    .await
    .map_err(|_| ApiError::Internal)??;
    Ok(StatusCode::OK)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StopMessage {
    #[serde(default)]
    error: String,
}

/// `PUT /core/stop` — the core is done (or failed) with its stream.
pub(crate) async fn stop(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let token = auth::core_token(&headers)?;
    let msg: StopMessage = if body.is_empty() {
        StopMessage::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::BadRequest(format!("could not decode stop body: {err}")))?
    };
    let error_count = u32::from(!msg.error.is_empty());
    app.manager.deactivate_stream(&token, error_count)?;
    Ok(StatusCode::OK)
}

/// `POST /core/heartbeat` — push the session's expiration out.
pub(crate) async fn heartbeat(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = auth::core_token(&headers)?;
    app.manager.reset_active_stream(&token)?;
    Ok(StatusCode::OK)
}
