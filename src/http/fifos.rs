//! FIFO operation HTTP handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;

use super::types::{
    parse_uuid, ApiError, AppState, FifoCreatedResponse, NewFifoParams, TicketCreatedResponse,
    TicketParams,
};

/// Create a fifo. Also accepts GET without a body for historical reasons.
pub async fn new_fifo(
    State(mgr): State<AppState>,
    Query(params): Query<NewFifoParams>,
) -> Result<Json<FifoCreatedResponse>, ApiError> {
    let config = params.into_config()?;
    let uuid = mgr.create_fifo(config)?;
    Ok(Json(FifoCreatedResponse { uuid }))
}

/// Enqueue a ticket. Duration params override the fifo's stage timeouts for
/// this ticket only, and only when the fifo allows overrides; otherwise
/// they are ignored.
pub async fn create_ticket(
    State(mgr): State<AppState>,
    Path(fifo): Path<String>,
    Query(params): Query<TicketParams>,
) -> Result<Json<TicketCreatedResponse>, ApiError> {
    let fifo = parse_uuid(&fifo)?;
    let overrides = params.into_overrides()?;
    let ticket = mgr.create_ticket(fifo, overrides)?;
    Ok(Json(TicketCreatedResponse { ticket }))
}

/// Long-poll until the ticket reaches the head of its queue.
///
/// 408 when the ticket's wait deadline elapses first (the ticket stays
/// queued); 410 when the ticket was evicted while parked.
pub async fn wait_ticket(
    State(mgr): State<AppState>,
    Path((fifo, ticket)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let fifo = parse_uuid(&fifo)?;
    let ticket = parse_uuid(&ticket)?;
    mgr.wait(fifo, ticket).await?;
    Ok(StatusCode::OK)
}

/// Complete a ticket and advance the queue.
pub async fn done_ticket(
    State(mgr): State<AppState>,
    Path((fifo, ticket)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let fifo = parse_uuid(&fifo)?;
    let ticket = parse_uuid(&ticket)?;
    mgr.done(fifo, ticket)?;
    Ok(StatusCode::OK)
}
