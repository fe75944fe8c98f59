//! Shared plumbing for the command side: append an envelope to the log,
//! push the post-mutation view to the board's broadcast group.

use axum::http::StatusCode;
use serde::Serialize;
use tokio::task::JoinError;
use tracing::{error, warn};
use uuid::Uuid;

use retro_types::events::{BoardStreamEvent, DbEvent, EventAction};

use crate::state::AppState;

/// Append one envelope to the log. Waits only for the log to accept the
/// write, never for materialization. A refused append fails the request;
/// nothing was emitted, so no partial state exists anywhere.
pub async fn emit(state: &AppState, event: DbEvent) -> Result<(), StatusCode> {
    state.log.append(event).await.map_err(|e| {
        error!("log append failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Best-effort push of the same view the HTTP caller gets. Failures stay in
/// the registry; they never propagate to the emitting request.
pub async fn publish<T: Serialize>(
    state: &AppState,
    board_id: Uuid,
    entity: &'static str,
    action: EventAction,
    data: &T,
) {
    match BoardStreamEvent::new(entity, action, data) {
        Ok(event) => state.registry.publish(board_id, event).await,
        Err(e) => warn!("failed to encode stream event for board {}: {}", board_id, e),
    }
}

pub fn join_error(e: JoinError) -> StatusCode {
    error!("spawn_blocking join error: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}
