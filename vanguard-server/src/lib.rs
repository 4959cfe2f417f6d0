//! HTTP adapter for the VanguardQ engine.
//!
//! Handlers validate requests, call one engine operation and render the
//! result. Workers do not go through HTTP; they hold the engine directly.

pub mod config;
mod error;
mod routes;

use std::sync::Arc;

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use vanguard_queue::DynQueueEngine;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::{EnqueueRequest, JobView};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DynQueueEngine>,
}

/// Build the full router over an engine
pub fn router(engine: Arc<DynQueueEngine>) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/health", get(routes::health))
        .route("/jobs", post(routes::enqueue))
        .route("/jobs/delayed", post(routes::enqueue_delayed))
        .route("/jobs/{id}", get(routes::get_job).delete(routes::cancel_job))
        .route("/queues/{name}/stats", get(routes::queue_stats))
        .with_state(AppState { engine })
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
}
