//! # vfs-api
//!
//! HTTP surface of the vfs storage service: hash uploads, tree uploads,
//! blurhash previews, bulk scans, folder/file management and static serving
//! of the object root.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vfs_api::{router, AppState, ServerConfig, StorageConfig};
//! use vfs_jobs::IndexerConfig;
//!
//! let state = AppState::in_memory(
//!     ServerConfig::default(),
//!     StorageConfig::default(),
//!     IndexerConfig::default(),
//! );
//! let app = router(state);
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod services;
pub mod state;

pub use config::{ServerConfig, StorageConfig};
pub use error::ApiError;
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use uuid::Uuid;

use handlers::{files, folders, hashes, health, preview, scan, upload};

/// Room for multipart framing on top of the upload limit.
const MULTIPART_OVERHEAD: usize = 1 << 20;

/// Request ID generator using UUIDv7 (time-ordered).
#[derive(Clone, Copy)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router over `state`.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.server.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    let web_path = format!("/{}", state.storage.web_path.trim_matches('/'));
    let static_files = ServeDir::new(&state.storage.path);

    let app = Router::new()
        .route("/status", get(health::status))
        // Hash-addressed objects
        .route("/upload/hash", put(upload::put_hash).post(upload::post_hash))
        .route("/hash/url", get(hashes::hash_url))
        .route("/hash/urls", post(hashes::hash_urls))
        .route("/hash/:ns/:hash", delete(hashes::delete_hash))
        .route("/preview/:file", get(preview::public))
        .route("/preview/:ns/:file", get(preview::namespaced))
        .route("/scan-files", get(scan::scan_files).post(scan::scan_files))
        // Folder tree
        .route("/upload/file", put(upload::put_file).post(upload::post_file))
        .route("/folders", post(folders::create_folder))
        .route("/folders/favorites", get(folders::list_favorites))
        .route(
            "/folders/:id",
            get(folders::get_folder)
                .patch(folders::rename_folder)
                .delete(folders::delete_folder),
        )
        .route("/folders/:id/branch", get(folders::get_branch))
        .route("/folders/:id/move", post(folders::move_folder))
        .route("/folders/:id/favorite", put(folders::set_favorite))
        .route("/folders/:id/files", get(files::list_files))
        .route("/files/move", post(files::move_files))
        .route("/files/delete", post(files::delete_files))
        .route("/files/folder", get(files::folder_of_path))
        .route("/files/:id/folder", get(files::folder_of_file))
        .route("/files/:id/name", put(files::set_physical_name));

    let app = if web_path == "/" {
        app.fallback_service(static_files)
    } else {
        app.nest_service(&web_path, static_files)
    };

    app.layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::IF_MODIFIED_SINCE,
                ])
                .max_age(std::time::Duration::from_secs(3600)),
        )
        .with_state(state)
}
