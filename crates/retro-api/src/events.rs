use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use tracing::{info, warn};
use uuid::Uuid;

use retro_broadcast::BroadcastRegistry;

use crate::state::AppState;

/// Removes the channel from its group exactly once, whether the stream ended
/// by timeout, by group retirement, or because the client went away and the
/// stream future was dropped mid-poll.
struct UnsubscribeGuard {
    registry: BroadcastRegistry,
    board_id: Uuid,
    channel_id: Uuid,
}

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        let registry = self.registry.clone();
        let board_id = self.board_id;
        let channel_id = self.channel_id;
        tokio::spawn(async move {
            registry.unsubscribe(board_id, channel_id).await;
        });
    }
}

/// `GET /boards/{id}/events`: long-lived push stream of the board's
/// mutations, each message `{ "entity", "action", "data" }`.
pub async fn subscribe_events(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.registry.subscribe(board_id).await;
    let guard = UnsubscribeGuard {
        registry: state.registry.clone(),
        board_id,
        channel_id: subscription.id,
    };
    let timeout = state.sse_timeout;
    let mut receiver = subscription.receiver;

    let stream = async_stream::stream! {
        let _guard = guard;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            let next = tokio::select! {
                event = receiver.recv() => event,
                // Channels have a bounded lifetime; clients reconnect.
                _ = &mut deadline => {
                    info!("Push channel timeout for board {}", board_id);
                    break;
                }
            };

            // A closed receiver means the group was retired; nothing more
            // will arrive.
            let Some(event) = next else { break };

            match Event::default().json_data(&event) {
                Ok(sse_event) => yield Ok(sse_event),
                Err(e) => {
                    warn!("Failed to encode push event for board {}: {}", board_id, e);
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
