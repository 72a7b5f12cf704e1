//! Router-level integration tests, exercised with `tower::ServiceExt::oneshot`
//! the same way the library crates exercise their engines directly: an
//! in-memory sqlite pool, an in-memory object store, one registered "hot"
//! class, no network involved (mirrors `sync_protocol`'s own
//! `engine_with_library` test fixture).

use axum::body::Body;
use axum::http::{Request, StatusCode};
use camino::Utf8PathBuf;
use chunker::{AdaptiveSizer, ChunkerConfig};
use common::model::{Library, TokenKind};
use fs_graph::FsGraphEngine;
use id_translator::IdTranslator;
use object_backend::{ObjectBackend, S3Backend, Tier};
use object_store::memory::InMemory;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use store::MetadataStore;
use storage_manager::StorageManager;
use sync_protocol::SyncProtocolEngine;
use token_store::{InMemoryTokenStore, TokenStore};
use tower::ServiceExt;

use crate::config::ServerConfig;
use crate::state::AppState;

async fn test_state_with_library(tenant: &str, library_id: &str) -> AppState {
    install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = Arc::new(MetadataStore::new(pool).await.unwrap());
    store
        .put_library(&Library {
            tenant: tenant.to_string(),
            library_id: library_id.to_string(),
            owner: "alice".into(),
            name: "lib".into(),
            description: "".into(),
            head_commit_id: None,
            root_commit_id: None,
            size_bytes: 0,
            file_count: 0,
            version_ttl_secs: 3600,
            created_at: 1000,
            updated_at: 1000,
        })
        .await
        .unwrap();

    let fs_graph = Arc::new(FsGraphEngine::new(store.clone()));
    let translator = Arc::new(IdTranslator::new(store.clone()));
    let storage = Arc::new(StorageManager::new());
    let backend: Arc<dyn ObjectBackend> = Arc::new(S3Backend::new(
        Arc::new(InMemory::new()),
        "",
        Tier::Hot,
        Utf8PathBuf::from(std::env::temp_dir().to_string_lossy().to_string()),
    ));
    storage.register_class("hot", backend, None).await;
    storage.set_default_class("hot").await;

    let tokens: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
    let engine = Arc::new(SyncProtocolEngine::new(store.clone(), fs_graph.clone(), translator.clone(), storage.clone()));
    let chunker_config = ChunkerConfig::new(8 * 1024, 32 * 1024, 128 * 1024).unwrap();
    let adaptive = Arc::new(AdaptiveSizer::new(8 * 1024 * 1024, 64 * 1024, 128 * 1024 * 1024, 8.0));

    AppState {
        config: Arc::new(ServerConfig::default()),
        store,
        storage,
        tokens,
        engine,
        fs_graph,
        translator,
        chunker_config,
        adaptive,
        spill_dir: Utf8PathBuf::from(std::env::temp_dir().to_string_lossy().to_string()),
        spill_threshold: 16 * 1024 * 1024,
    }
}

#[tokio::test]
async fn protocol_version_is_exposed() {
    let state = test_state_with_library("t1", "lib1").await;
    let app = crate::routes::router(state);

    let res = app
        .oneshot(Request::builder().uri("/seafhttp/protocol-version").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["version"], sync_protocol::PROTOCOL_VERSION);
}

#[tokio::test]
async fn head_commit_mints_on_first_access_and_requires_tenant_header() {
    let state = test_state_with_library("t1", "lib1").await;
    let app = crate::routes::router(state);

    let unauthenticated = app
        .clone()
        .oneshot(Request::builder().uri("/seafhttp/repo/lib1/commit/HEAD").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(unauthenticated.status(), StatusCode::BAD_REQUEST);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/seafhttp/repo/lib1/commit/HEAD")
                .header("x-tenant-id", "t1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["head_commit_id"].is_string());
}

#[tokio::test]
async fn put_then_get_block_round_trips() {
    let state = test_state_with_library("t1", "lib1").await;
    let body = bytes::Bytes::from_static(b"hello world");
    let digest_hex = common::sha256(&body).to_hex();
    let app = crate::routes::router(state);

    let put = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/seafhttp/repo/lib1/block/{digest_hex}"))
                .header("x-tenant-id", "t1")
                .header("host", "anything.example.com")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(put.status(), StatusCode::OK);

    let get = app
        .oneshot(
            Request::builder()
                .uri(format!("/seafhttp/repo/lib1/block/{digest_hex}"))
                .header("x-tenant-id", "t1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get.status(), StatusCode::OK);
    let fetched = axum::body::to_bytes(get.into_body(), usize::MAX).await.unwrap();
    assert_eq!(fetched.as_ref(), body.as_ref());
}

#[tokio::test]
async fn permission_check_returns_bare_ok_with_no_body() {
    let state = test_state_with_library("t1", "lib1").await;
    let app = crate::routes::router(state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/seafhttp/repo/lib1/permission-check")
                .header("x-tenant-id", "t1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn upload_then_download_round_trip_through_rest_api() {
    let state = test_state_with_library("t1", "lib1").await;
    let upload_token = state
        .tokens
        .create_upload_token("t1", "lib1", "report.txt", "alice", Duration::from_secs(3600))
        .await
        .unwrap();

    let app = crate::routes::router(state.clone());
    let payload = b"line one\nline two\nline three\n".repeat(64);
    let multipart_body = [
        b"--X-BOUNDARY\r\n".as_slice(),
        b"Content-Disposition: form-data; name=\"file\"; filename=\"report.txt\"\r\n\r\n",
        &payload,
        b"\r\n--X-BOUNDARY--\r\n",
    ]
    .concat();

    let upload_res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/seafhttp/upload-api/{}", upload_token.token))
                .header("content-type", "multipart/form-data; boundary=X-BOUNDARY")
                .body(Body::from(multipart_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(upload_res.status(), StatusCode::OK);

    // upload tokens are single-use
    let second_attempt = state.tokens.get_token(&upload_token.token, TokenKind::Upload).await;
    assert!(second_attempt.is_err());

    let download_token = state
        .tokens
        .create_download_token("t1", "lib1", "report.txt", "alice", Duration::from_secs(3600))
        .await
        .unwrap();
    let download_res = app
        .oneshot(
            Request::builder()
                .uri(format!("/seafhttp/files/{}/report.txt", download_token.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(download_res.status(), StatusCode::OK);
    let fetched = axum::body::to_bytes(download_res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(fetched.as_ref(), payload.as_slice());
}
