//! Route-level tests exercising the full stack: router, manager, payload
//! store, catalog, and the deferred-write queue.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http_body_util::BodyExt;
use md5::{Digest, Md5};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use streamvault_catalog::{Catalog, FileCatalog, UserRecord};
use streamvault_server::{routes, App, VaultConfig};

const MANAGER_TOKEN: &str = "tok-alice";
const DONOR_TOKEN: &str = "tok-donor";
const PASSWORD: &str = "assignment-secret";

struct TestVault {
    app: Arc<App>,
    router: Router,
    catalog: Arc<FileCatalog>,
    worker: JoinHandle<()>,
    _data_dir: TempDir,
    catalog_dir: TempDir,
}

impl TestVault {
    /// Stops the deferred-write worker and waits for the final drain.
    async fn drain_writes(&mut self) {
        self.app.begin_shutdown();
        (&mut self.worker).await.unwrap();
    }
}

fn vault() -> TestVault {
    let data_dir = TempDir::new().unwrap();
    let catalog_dir = TempDir::new().unwrap();
    let catalog = Arc::new(FileCatalog::open(catalog_dir.path()).unwrap());
    catalog
        .put_user(
            "alice",
            UserRecord {
                token: MANAGER_TOKEN.to_owned(),
                manager: true,
            },
        )
        .unwrap();
    catalog
        .put_user(
            "donor",
            UserRecord {
                token: DONOR_TOKEN.to_owned(),
                manager: false,
            },
        )
        .unwrap();
    catalog
        .put_target_options("t1", serde_json::json!({"steps_per_frame": 50000}))
        .unwrap();

    let config = VaultConfig {
        name: "vault-test".to_owned(),
        listen: "127.0.0.1:0".to_owned(),
        data_dir: data_dir.path().to_path_buf(),
        catalog_dir: catalog_dir.path().to_path_buf(),
        password: PASSWORD.to_owned(),
        expiration_seconds: 1200,
    };
    let (app, worker) = App::new(config, catalog.clone()).unwrap();
    let router = routes::router(Arc::clone(&app));
    TestVault {
        app,
        router,
        catalog,
        worker,
        _data_dir: data_dir,
        catalog_dir,
    }
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec();
    (status, body)
}

fn json_body(value: &serde_json::Value) -> Body {
    Body::from(serde_json::to_vec(value).unwrap())
}

async fn create_stream(router: &Router) -> String {
    let body = serde_json::json!({
        "target_id": "t1",
        "files": {"system.xml": "<system/>", "integrator.xml": "<integrator/>"},
    });
    let (status, reply) = send(
        router,
        Request::post("/streams")
            .header(header::AUTHORIZATION, MANAGER_TOKEN)
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&body))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reply: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    reply["stream_id"].as_str().unwrap().to_owned()
}

async fn activate(router: &Router) -> String {
    let body = serde_json::json!({"target_id": "t1", "engine": "openmm", "user": "donor"});
    let (status, reply) = send(
        router,
        Request::post("/streams/activate")
            .header(header::AUTHORIZATION, PASSWORD)
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&body))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reply: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    reply["token"].as_str().unwrap().to_owned()
}

fn md5_framed(body: &serde_json::Value) -> (String, Vec<u8>) {
    let bytes = serde_json::to_vec(body).unwrap();
    (hex::encode(Md5::digest(&bytes)), bytes)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_creation_auth_and_info() {
    let vault = vault();

    // No credential, then a non-manager credential.
    let body = serde_json::json!({"target_id": "t1", "files": {}});
    let (status, _) = send(
        &vault.router,
        Request::post("/streams")
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&body))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &vault.router,
        Request::post("/streams")
            .header(header::AUTHORIZATION, DONOR_TOKEN)
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&body))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let stream_id = create_stream(&vault.router).await;
    let (status, reply) = send(
        &vault.router,
        Request::get(format!("/streams/info/{stream_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let info: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(info["owner"], "alice");
    assert_eq!(info["status"], "enabled");
    assert_eq!(info["frames"], 0);
    assert_eq!(info["active"], false);

    let (status, _) = send(
        &vault.router,
        Request::get("/streams/info/unknown-stream")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_activation_requires_shared_secret() {
    let vault = vault();
    create_stream(&vault.router).await;

    let body = serde_json::json!({"target_id": "t1", "engine": "openmm", "user": "donor"});
    let (status, _) = send(
        &vault.router,
        Request::post("/streams/activate")
            .header(header::AUTHORIZATION, "wrong-secret")
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&body))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = activate(&vault.router).await;

    // The core can pick up its start files and target options.
    let (status, reply) = send(
        &vault.router,
        Request::get("/core/start")
            .header(header::AUTHORIZATION, &token)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let start: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(start["target_id"], "t1");
    assert_eq!(start["options"]["steps_per_frame"], 50000);
    let seed = start["files"]["system.xml.b64"].as_str().unwrap();
    assert_eq!(BASE64.decode(seed).unwrap(), b"<system/>");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_core_work_cycle() {
    let vault = vault();
    let stream_id = create_stream(&vault.router).await;
    let token = activate(&vault.router).await;

    // Two frames, with a duplicate rejected in between.
    let frame = serde_json::json!({
        "files": {"frames.xtc.b64": BASE64.encode(b"frame-one")}
    });
    let (digest, bytes) = md5_framed(&frame);
    for (attempt, expected) in [(1, StatusCode::OK), (2, StatusCode::BAD_REQUEST)] {
        let (status, _) = send(
            &vault.router,
            Request::post("/core/frame")
                .header(header::AUTHORIZATION, &token)
                .header("content-md5", &digest)
                .body(Body::from(bytes.clone()))
                .unwrap(),
        )
        .await;
        assert_eq!(status, expected, "frame attempt {attempt}");
    }

    let frame = serde_json::json!({
        "files": {"frames.xtc.b64": BASE64.encode(b"frame-two")}
    });
    let (digest, bytes) = md5_framed(&frame);
    let (status, _) = send(
        &vault.router,
        Request::post("/core/frame")
            .header(header::AUTHORIZATION, &token)
            .header("content-md5", &digest)
            .body(Body::from(bytes))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // A frame with a corrupt digest is rejected before it reaches disk.
    let (status, _) = send(
        &vault.router,
        Request::post("/core/frame")
            .header(header::AUTHORIZATION, &token)
            .header("content-md5", "0000")
            .body(Body::from("{\"files\":{}}"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Commit both frames.
    let checkpoint = serde_json::json!({
        "files": {"state.xml.b64": BASE64.encode(b"<state v=2/>")},
        "frames": 2.0,
    });
    let (digest, bytes) = md5_framed(&checkpoint);
    let (status, _) = send(
        &vault.router,
        Request::post("/core/checkpoint")
            .header(header::AUTHORIZATION, &token)
            .header("content-md5", &digest)
            .body(Body::from(bytes))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &vault.router,
        Request::post("/core/heartbeat")
            .header(header::AUTHORIZATION, &token)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &vault.router,
        Request::put("/core/stop")
            .header(header::AUTHORIZATION, &token)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The token died with the session.
    let (status, _) = send(
        &vault.router,
        Request::post("/core/heartbeat")
            .header(header::AUTHORIZATION, &token)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, reply) = send(
        &vault.router,
        Request::get(format!("/streams/info/{stream_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let info: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(info["frames"], 2);
    assert_eq!(info["active"], false);

    // Once the deferred writes land, the catalog reflects the session:
    // updated frame count plus a stats line for the donor.
    let mut vault = vault;
    vault.drain_writes().await;
    let records = vault.catalog.load_streams().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].frames, 2);
    let stats = std::fs::read_to_string(
        vault.catalog_dir.path().join("stats").join("t1.jsonl"),
    )
    .unwrap();
    assert_eq!(stats.lines().count(), 1);
    assert!(stats.contains("\"user\":\"donor\""));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_owner_lifecycle_routes() {
    let vault = vault();
    let stream_id = create_stream(&vault.router).await;

    let (status, _) = send(
        &vault.router,
        Request::put(format!("/streams/stop/{stream_id}"))
            .header(header::AUTHORIZATION, MANAGER_TOKEN)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Disabled streams are not handed out.
    let body = serde_json::json!({"target_id": "t1", "engine": "openmm", "user": "donor"});
    let (status, _) = send(
        &vault.router,
        Request::post("/streams/activate")
            .header(header::AUTHORIZATION, PASSWORD)
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&body))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &vault.router,
        Request::put(format!("/streams/start/{stream_id}"))
            .header(header::AUTHORIZATION, MANAGER_TOKEN)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    activate(&vault.router).await;

    // Deleting tears the stream down even while a core holds it.
    let (status, _) = send(
        &vault.router,
        Request::put(format!("/streams/delete/{stream_id}"))
            .header(header::AUTHORIZATION, MANAGER_TOKEN)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &vault.router,
        Request::get(format!("/streams/info/{stream_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let store_dir = vault.app.store.stream_dir(&stream_id);
    let mut vault = vault;
    vault.drain_writes().await;
    assert!(vault.catalog.load_streams().unwrap().is_empty());
    assert!(!store_dir.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_download_is_owner_only_and_contained() {
    let vault = vault();
    let stream_id = create_stream(&vault.router).await;

    let (status, body) = send(
        &vault.router,
        Request::get(format!("/streams/download/{stream_id}/files/system.xml"))
            .header(header::AUTHORIZATION, MANAGER_TOKEN)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<system/>");

    let (status, _) = send(
        &vault.router,
        Request::get(format!("/streams/download/{stream_id}/files/system.xml"))
            .header(header::AUTHORIZATION, DONOR_TOKEN)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &vault.router,
        Request::get(format!("/streams/download/{stream_id}/files/..%2F..%2Fetc%2Fpasswd"))
            .header(header::AUTHORIZATION, MANAGER_TOKEN)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Owners can list what is on disk.
    let (status, reply) = send(
        &vault.router,
        Request::get(format!("/streams/sync/{stream_id}"))
            .header(header::AUTHORIZATION, MANAGER_TOKEN)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let listing: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(listing["partitions"], serde_json::json!([]));
    assert_eq!(
        listing["seed_files"],
        serde_json::json!(["integrator.xml", "system.xml"])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restore_after_restart() {
    let data_dir = TempDir::new().unwrap();
    let catalog_dir = TempDir::new().unwrap();
    let catalog = Arc::new(FileCatalog::open(catalog_dir.path()).unwrap());
    catalog
        .put_user(
            "alice",
            UserRecord {
                token: MANAGER_TOKEN.to_owned(),
                manager: true,
            },
        )
        .unwrap();
    catalog
        .put_target_options("t1", serde_json::json!({}))
        .unwrap();
    let config = VaultConfig {
        name: "vault-test".to_owned(),
        listen: "127.0.0.1:0".to_owned(),
        data_dir: data_dir.path().to_path_buf(),
        catalog_dir: catalog_dir.path().to_path_buf(),
        password: PASSWORD.to_owned(),
        expiration_seconds: 1200,
    };

    let stream_id = {
        let (app, worker) = App::new(config.clone(), catalog.clone()).unwrap();
        let router = routes::router(Arc::clone(&app));
        let stream_id = create_stream(&router).await;
        app.begin_shutdown();
        worker.await.unwrap();
        stream_id
    };

    // An orphan payload directory with no catalog record gets cleaned up.
    std::fs::create_dir_all(data_dir.path().join("streams").join("orphan-stream")).unwrap();

    let (app, worker) = App::new(config, catalog).unwrap();
    assert_eq!(app.manager.stream_count(), 1);
    assert!(app
        .manager
        .read_stream(&stream_id, |stream, _| Ok(stream.owner().to_owned()))
        .is_ok());
    assert!(!data_dir
        .path()
        .join("streams")
        .join("orphan-stream")
        .exists());
    app.begin_shutdown();
    worker.await.unwrap();
}
