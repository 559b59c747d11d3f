//! HTTP API module.

mod fifos;
mod types;


use axum::http::Method;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

pub use types::AppState;

/// Create the HTTP router. Every route is registered for both GET and
/// POST: requests carry no bodies, and historical clients use either
/// method.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    Router::new()
        .route("/fifo/new", get(fifos::new_fifo).post(fifos::new_fifo))
        .route(
            "/fifo/{uuid}/ticket",
            get(fifos::create_ticket).post(fifos::create_ticket),
        )
        .route(
            "/fifo/{uuid}/wait/{ticket}",
            get(fifos::wait_ticket).post(fifos::wait_ticket),
        )
        .route(
            "/fifo/{uuid}/done/{ticket}",
            get(fifos::done_ticket).post(fifos::done_ticket),
        )
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
