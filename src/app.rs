//! 路由与中间件装配。

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::config::GatewayConfig;
use crate::http::{add_security_headers, build_cors_layer, client_ip};
use crate::locking::LockManager;
use crate::storage::Storage;
use crate::{files, health, upload};

/// Builds the gateway router: upload, retrieve, health and the `/uploads` mirror.
pub fn build_router(
    storage: Arc<Storage>,
    locks: Arc<LockManager>,
    config: Arc<GatewayConfig>,
) -> Router {
    let body_limit = match config.body_limit() {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    let mut app = Router::new()
        .route("/upload", post(upload::upload_file).layer(body_limit))
        .route("/file/{*path}", get(files::retrieve_file))
        .route("/health", get(health::health))
        .nest_service("/uploads", ServeDir::new(storage.root_path()))
        .layer(middleware::from_fn(add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip = %client_ip(request),
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(locks))
        .layer(Extension(config.clone()));

    if let Some(cors_layer) = build_cors_layer(&config.cors_origins) {
        app = app.layer(cors_layer);
    }
    app
}
