//! Router-level tests over in-memory repositories and a temporary object root.

use std::io::Cursor;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use vfs_api::{router, AppState, ServerConfig, StorageConfig};
use vfs_core::{digest_bytes, shard_path};
use vfs_jobs::IndexerConfig;

const BOUNDARY: &str = "vfs-test-boundary";

struct TestApp {
    _dir: TempDir,
    root: std::path::PathBuf,
    state: AppState,
    app: Router,
}

impl TestApp {
    fn new() -> Self {
        Self::with_server(ServerConfig::default())
    }

    fn with_server(server: ServerConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let storage = StorageConfig::default().with_path(&root);
        let state = AppState::in_memory(server, storage, IndexerConfig::default());
        let app = router(state.clone());
        Self {
            _dir: dir,
            root,
            state,
            app,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn json(&self, req: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(req).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 4) as u8, (y * 8) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn put_bytes(uri: &str, data: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .body(Body::from(data))
        .unwrap()
}

fn send_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart(uri: &str, field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_status_ok_without_database() {
    let app = TestApp::new();
    let (status, _, body) = app.send(get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_hash_upload_is_content_addressed_and_idempotent() {
    let app = TestApp::new();
    let data = png(64, 32);
    let digest = digest_bytes(&data);
    let rel = format!("{}.png", shard_path(&digest));

    let (status, first) = app
        .json(put_bytes("/upload/hash?ext=png", data.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["hash"], digest);
    assert_eq!(first["webPath"], format!("/media/{rel}"));
    assert_eq!(first["ext"], "png");
    assert!(app.root.join(&rel).is_file());

    let (status, second) = app.json(put_bytes("/upload/hash?ext=png", data)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, first);

    let record = app.state.hashes.get(&digest, "default").await.unwrap();
    assert!(record.is_some_and(|r| r.indexed_at.is_none()));
}

#[tokio::test]
async fn test_hash_upload_multipart_into_namespace() {
    let app = TestApp::new();
    let data = png(8, 8);
    let digest = digest_bytes(&data);

    let (status, body) = app
        .json(multipart("/upload/hash?ns=items&ext=png", "file", "a.png", &data))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["webPath"],
        format!("/media/items/{}.png", shard_path(&digest))
    );
    assert!(app
        .state
        .hashes
        .get(&digest, "items")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_hash_upload_rejections() {
    let app = TestApp::new();

    let (status, body) = app
        .json(put_bytes("/upload/hash?ns=bogus&ext=png", png(4, 4)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid namespace");

    let (status, body) = app
        .json(put_bytes("/upload/hash?ext=exe", png(4, 4)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid extension");

    let (status, body) = app
        .json(put_bytes("/upload/hash?ext=png", b"plain text, not an image".to_vec()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid mime type");

    let (status, body) = app
        .json(multipart("/upload/hash?ext=png", "other", "a.png", &png(4, 4)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing form field file");
}

#[tokio::test]
async fn test_hash_upload_too_large() {
    let app = TestApp::with_server(ServerConfig::default().with_max_upload_size(16));
    let (status, body) = app
        .json(put_bytes("/upload/hash?ext=png", png(16, 16)))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "file size exceed 16 bytes");
}

#[tokio::test]
async fn test_multipart_upload_too_large_leaves_no_files() {
    let app = TestApp::with_server(ServerConfig::default().with_max_upload_size(64));

    let (status, body) = app
        .json(multipart("/upload/hash?ext=png", "file", "big.png", &png(64, 64)))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "file size exceed 64 bytes");

    let (status, _) = app
        .json(multipart("/upload/file?folderId=1", "file", "big.png", &png(64, 64)))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let leftovers = std::fs::read_dir(&app.root).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_preview_lifecycle() {
    let app = TestApp::new();
    let data = png(64, 32);
    let digest = digest_bytes(&data);
    app.send(put_bytes("/upload/hash?ext=png", data)).await;

    let uri = format!("/preview/{digest}.png");
    let (status, body) = app.json(get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "hash not indexed yet");

    assert_eq!(app.state.scheduler.process_queue().await.unwrap(), 1);

    let (status, headers, body) = app.send(get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=31536000");
    let preview = image::load_from_memory(&body).unwrap();
    assert_eq!((preview.width(), preview.height()), (32, 16));

    // Namespace that is not configured falls back to the public one.
    let (status, _, _) = app.send(get(&format!("/preview/unknown/{digest}"))).await;
    assert_eq!(status, StatusCode::OK);

    let last_modified = headers[header::LAST_MODIFIED].clone();
    let conditional = Request::builder()
        .uri(&uri)
        .header(header::IF_MODIFIED_SINCE, last_modified)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = app.send(conditional).await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert!(body.is_empty());

    let stale = Request::builder()
        .uri(&uri)
        .header(header::IF_MODIFIED_SINCE, "Mon, 01 Jan 2001 00:00:00 GMT")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(stale).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_preview_unknown_hash() {
    let app = TestApp::new();
    let (status, body) = app
        .json(get("/preview/items/64a9f060983200709061894cc5f69f83"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "hash not found");
}

#[tokio::test]
async fn test_scan_registers_objects_once() {
    let app = TestApp::new();
    let data = png(8, 8);
    let digest = digest_bytes(&data);
    let path = app
        .root
        .join("items")
        .join(format!("{}.png", shard_path(&digest)));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, &data).unwrap();

    let (status, body) = app.json(get("/scan-files")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scanned"], 1);
    assert_eq!(body["added"], 1);

    let (status, body) = app
        .json(Request::builder().method("POST").uri("/scan-files").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], 0);

    let record = app.state.hashes.get(&digest, "items").await.unwrap().unwrap();
    assert_eq!(record.extension, "png");
}

#[tokio::test]
async fn test_scan_conflicts_while_running() {
    let app = TestApp::new();
    let _guard = app.state.scheduler.scan_flight().try_acquire().unwrap();

    let (status, body) = app.json(get("/scan-files")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already scanning");
}

#[tokio::test]
async fn test_delete_hash_removes_record_and_object() {
    let app = TestApp::new();
    let data = png(8, 8);
    let digest = digest_bytes(&data);
    app.send(put_bytes("/upload/hash?ext=png", data)).await;

    let uri = format!("/hash/default/{digest}");
    let req = || Request::builder().method("DELETE").uri(&uri).body(Body::empty()).unwrap();

    let (status, _, _) = app.send(req()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!app.root.join(format!("{}.png", shard_path(&digest))).exists());
    assert!(app.state.hashes.get(&digest, "default").await.unwrap().is_none());

    let (status, _, _) = app.send(req()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hash_urls() {
    let app = TestApp::new();
    let hash = "64a9f060983200709061894cc5f69f83";

    let (status, body) = app
        .json(get(&format!("/hash/url?hash={hash}&ns=items&type=small")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["webPath"], format!("/media/items/small/6/4a/{hash}.jpg"));

    let (status, body) = app
        .json(send_json(
            "POST",
            "/hash/urls",
            json!({ "hashes": [format!("{hash}.png"), hash], "ns": "" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["hash"], format!("{hash}.png"));
    assert_eq!(body[0]["webPath"], format!("/media/6/4a/{hash}.png"));
    assert_eq!(body[1]["webPath"], format!("/media/6/4a/{hash}.jpg"));
}

#[tokio::test]
async fn test_static_serving_of_objects() {
    let app = TestApp::new();
    let data = png(8, 8);
    let (_, body) = app.json(put_bytes("/upload/hash?ext=png", data.clone())).await;
    let web_path = body["webPath"].as_str().unwrap().to_string();

    let (status, _, served) = app.send(get(&web_path)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, data);
}

#[tokio::test]
async fn test_folder_tree_and_move_cycle() {
    let app = TestApp::new();

    let (status, a) = app
        .json(send_json("POST", "/folders", json!({ "parentId": 1, "name": "a" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let a_id = a["id"].as_i64().unwrap();

    let (_, b) = app
        .json(send_json("POST", "/folders", json!({ "parentId": a_id, "name": "b" })))
        .await;
    let b_id = b["id"].as_i64().unwrap();

    let (status, body) = app
        .json(send_json(
            "POST",
            &format!("/folders/{a_id}/move"),
            json!({ "destinationId": b_id }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("inside"));

    let (status, branch) = app.json(get(&format!("/folders/{b_id}/branch"))).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = branch
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, a_id, b_id]);

    let (status, _) = app
        .json(send_json("POST", "/folders/1/move", json!({ "destinationId": a_id })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(send_json(
            "PUT",
            &format!("/folders/{a_id}/favorite"),
            json!({ "isFavorite": true }),
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, favorites) = app.json(get("/folders/favorites")).await;
    assert_eq!(favorites[0]["id"], a_id);

    let (status, root) = app.json(get("/folders/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(root["folders"][0]["title"], "a");
}

#[tokio::test]
async fn test_tree_upload_and_listing() {
    let app = TestApp::new();

    let (status, file) = app
        .json(multipart("/upload/file?folderId=1", "file", "Cat Photo.PNG", &png(20, 10)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(file["name"], "Cat Photo");
    assert_eq!(file["ext"], "png");
    let file_id = file["id"].as_i64().unwrap();

    let (status, listing) = app.json(get("/folders/1/files?pageSize=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total"], 1);
    let stored = &listing["files"][0];
    assert_eq!(stored["width"], 20);
    assert_eq!(stored["height"], 10);
    let path = stored["path"].as_str().unwrap();
    assert!(path.ends_with(&format!("/1_{file_id}.png")));
    assert!(app.root.join(path).is_file());

    let (status, folder) = app.json(get(&format!("/files/{file_id}/folder"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(folder["id"], 1);

    let (status, _) = app
        .json(send_json(
            "PUT",
            &format!("/files/{file_id}/name"),
            json!({ "name": "Not Valid!" }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);

    let (status, _) = app
        .json(put_bytes("/upload/file?folderId=999&ext=png", png(4, 4)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
