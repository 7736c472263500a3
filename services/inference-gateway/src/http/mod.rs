//! Public HTTP surface: `/predict`, `/example-image`, `/classes`.

pub mod error;
pub mod handlers;

use crate::pipeline::Pipeline;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Shared read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub http: reqwest::Client,
    pub example_image_url: Arc<str>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, http: reqwest::Client, example_image_url: &str) -> Self {
        Self { pipeline: Arc::new(pipeline), http, example_image_url: Arc::from(example_image_url) }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let routes = Router::new()
        .route("/predict", post(handlers::predict).fallback(handlers::method_not_allowed))
        .route("/example-image", get(handlers::example_image).fallback(handlers::method_not_allowed))
        .route("/classes", get(handlers::classes).fallback(handlers::method_not_allowed))
        .fallback(handlers::not_found);
    with_service_layers(routes, max_upload_bytes).with_state(state)
}

/// Body limit, panic catch-all, request tracing and permissive CORS, in that
/// order from the inside out. CORS is outermost so error and panic responses
/// carry the header too.
pub fn with_service_layers<S>(routes: Router<S>, max_upload_bytes: usize) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let cors = CorsLayer::new().allow_origin(AnyOrigin).allow_methods(AnyOrigin).allow_headers(AnyOrigin);
    routes
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "handler panicked");
    error::error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Internal server error: {detail}"))
}
