//! PDF merge workspace server
//!
//! Users upload PDFs, Word documents and images into a private per-session
//! workspace, merge them in the order they choose, optionally protect the
//! result with a password and download it.
//!
//! ## Layers
//!
//! - [`workspace`]: one directory per session holding every artifact
//! - [`convert`]: images and Word documents to PDF
//! - [`assembly`]: ordered merge and encryption, written temp-then-rename
//! - [`pipeline`]: the session operations, serialized per session
//! - [`handlers`]: the HTTP surface

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod assembly;
pub mod config;
pub mod convert;
pub mod error;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod state;
pub mod workspace;


pub use config::{AppConfig, Args};
pub use error::PipelineError;
pub use pipeline::Pipeline;
pub use state::AppState;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    let session_routes = Router::new()
        .route("/upload", post(handlers::upload_file))
        .route("/remove", post(handlers::remove_file))
        .route("/merge", post(handlers::merge_files))
        .route("/preview/:file_id", get(handlers::preview_file))
        .route("/download-merged", get(handlers::download_merged))
        .route("/clear", post(handlers::clear_session))
        .route("/status", get(handlers::session_status))
        .layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            session::resolve_session,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(session_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
