//! Manager-facing stream administration routes.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use streamvault_catalog::StreamRecord;
use streamvault_core::{new_stream_id, unix_now, Stream, StreamInfo, StreamStatus, VaultError};
use streamvault_store::SyncListing;

use super::file_bytes;
use crate::app::App;
use crate::auth;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateStreamRequest {
    target_id: String,
    files: HashMap<String, String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// `POST /streams` — create a stream under the caller's ownership.
pub(crate) async fn create(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(req): Json<CreateStreamRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let owner = auth::current_manager(&app, &headers)?;
    let stream_id = new_stream_id();
    let record = StreamRecord {
        stream_id: stream_id.clone(),
        target_id: req.target_id.clone(),
        owner,
        frames: 0,
        error_count: 0,
        status: StreamStatus::Enabled,
        creation_date: unix_now(),
    };

    let worker_app = Arc::clone(&app);
    tokio::task::spawn_blocking(move || -> Result<(), ApiError> {
        let seeds = file_bytes(req.files);
        let tags = file_bytes(req.tags);
        worker_app
            .store
            .create_stream(&record.stream_id, &seeds, &tags)?;
        if let Err(err) = worker_app.catalog.insert_stream(&record) {
            // Roll the half-created stream back off disk.
            let _ = worker_app.store.remove_stream(&record.stream_id);
            return Err(err.into());
        }
        let stream = Stream::new(
            record.stream_id.clone(),
            record.target_id.clone(),
            record.owner.clone(),
            0,
            0,
            record.creation_date,
        );
        if let Err(err) = worker_app.manager.add_stream(stream, true) {
            let _ = worker_app.catalog.remove_stream(&record.stream_id);
            let _ = worker_app.store.remove_stream(&record.stream_id);
            return Err(err.into());
        }
        info!(stream_id = %record.stream_id, target_id = %record.target_id, "stream created");
        Ok(())
    })
    .await
    .map_err(|_| ApiError::Internal)??;

    Ok(Json(serde_json::json!({ "stream_id": stream_id })))
}

/// `GET /streams/info/{stream_id}` — public stream metadata.
pub(crate) async fn info(
    State(app): State<Arc<App>>,
    Path(stream_id): Path<String>,
) -> Result<Json<StreamInfo>, ApiError> {
    let info = app
        .manager
        .read_stream(&stream_id, |stream, state| Ok(stream.info(state)))?;
    Ok(Json(info))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActivateRequest {
    target_id: String,
    engine: String,
    user: String,
}

/// `POST /streams/activate` — the assignment service hands a stream to a
/// core. Authenticated by the shared secret, not a user credential.
pub(crate) async fn activate(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(req): Json<ActivateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if auth::authorization(&headers) != Some(app.config.password.as_str()) {
        return Err(ApiError::Unauthorized);
    }

    let worker_app = Arc::clone(&app);
    let activation = tokio::task::spawn_blocking(move || {
        worker_app
            .manager
            .activate_stream(&req.target_id, &req.user, &req.engine, |stream, _state| {
                // A previous holder may have died mid-frame; start clean.
                worker_app
                    .store
                    .clear_buffer(stream.stream_id())
                    .map_err(VaultError::callback)
            })
    })
    .await
    .map_err(|_| ApiError::Internal)??;

    Ok(Json(serde_json::json!({ "token": activation.token })))
}

/// `GET /streams/download/{stream_id}/{path}` — owner-only payload read.
pub(crate) async fn download(
    State(app): State<Arc<App>>,
    Path((stream_id, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Vec<u8>, ApiError> {
    let user = auth::current_user(&app, &headers)?;
    let worker_app = Arc::clone(&app);
    let bytes = tokio::task::spawn_blocking(move || {
        worker_app.manager.read_stream(&stream_id, |stream, _state| {
            if stream.owner() != user {
                return Err(VaultError::NotOwner {
                    user: user.clone(),
                    stream_id: stream.stream_id().to_owned(),
                });
            }
            worker_app
                .store
                .read_file(stream.stream_id(), &path)
                .map_err(VaultError::callback)
        })
    })
    .await
    .map_err(|_| ApiError::Internal)??;
    Ok(bytes)
}

/// `PUT /streams/start/{stream_id}` — re-enable a stream.
pub(crate) async fn start(
    State(app): State<Arc<App>>,
    Path(stream_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = auth::current_manager(&app, &headers)?;
    app.manager.enable_stream(&stream_id, &user)?;
    Ok(StatusCode::OK)
}

/// `PUT /streams/stop/{stream_id}` — disable a stream.
pub(crate) async fn stop(
    State(app): State<Arc<App>>,
    Path(stream_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = auth::current_manager(&app, &headers)?;
    app.manager.disable_stream(&stream_id, &user)?;
    Ok(StatusCode::OK)
}

/// `PUT /streams/delete/{stream_id}` — remove a stream. The in-memory
/// deletion is immediate; catalog and payload cleanup ride the deferred
/// queue.
pub(crate) async fn delete(
    State(app): State<Arc<App>>,
    Path(stream_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = auth::current_manager(&app, &headers)?;
    app.manager.remove_stream(&stream_id, &user)?;

    let catalog = Arc::clone(&app.catalog);
    let id = stream_id.clone();
    app.queue
        .push_fn(move || catalog.remove_stream(&id).map_err(Into::into));
    let store = app.store.clone();
    app.queue
        .push_fn(move || store.remove_stream(&stream_id).map_err(Into::into));
    Ok(StatusCode::OK)
}

/// `GET /streams/sync/{stream_id}` — owner-only on-disk listing.
pub(crate) async fn sync(
    State(app): State<Arc<App>>,
    Path(stream_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SyncListing>, ApiError> {
    let user = auth::current_manager(&app, &headers)?;
    let worker_app = Arc::clone(&app);
    let listing = tokio::task::spawn_blocking(move || {
        worker_app.manager.read_stream(&stream_id, |stream, _state| {
            if stream.owner() != user {
                return Err(VaultError::NotOwner {
                    user: user.clone(),
                    stream_id: stream.stream_id().to_owned(),
                });
            }
            worker_app
                .store
                .sync_listing(stream.stream_id())
                .map_err(VaultError::callback)
        })
    })
    .await
    .map_err(|_| ApiError::Internal)??;
    Ok(Json(listing))
}
