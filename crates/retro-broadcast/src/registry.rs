use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use retro_types::events::BoardStreamEvent;

/// One subscriber's push channel.
struct Channel {
    id: Uuid,
    tx: mpsc::UnboundedSender<BoardStreamEvent>,
}

/// The live subscribers of one board.
///
/// Each group carries its own lock so activity on one board never contends
/// with another. `last_active` moves on every add and every send; the reaper
/// reads it to find groups nobody is watching anymore.
struct BoardGroup {
    channels: Mutex<Vec<Channel>>,
    last_active: Mutex<Instant>,
}

impl BoardGroup {
    fn new() -> Self {
        Self {
            channels: Mutex::new(Vec::new()),
            last_active: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_active.lock().expect("last_active lock poisoned") = Instant::now();
    }

    fn idle_since(&self) -> Instant {
        *self.last_active.lock().expect("last_active lock poisoned")
    }

    fn add(&self, channel: Channel) {
        self.channels
            .lock()
            .expect("channel lock poisoned")
            .push(channel);
        self.touch();
    }

    /// Deliver to every channel in registration order. A channel whose
    /// receiver is gone is pruned; delivery continues to the rest.
    fn send_all(&self, board_id: Uuid, event: &BoardStreamEvent) {
        let mut channels = self.channels.lock().expect("channel lock poisoned");
        channels.retain(|channel| {
            if channel.tx.send(event.clone()).is_ok() {
                true
            } else {
                warn!(
                    "Dropping dead channel {} on board {}",
                    channel.id, board_id
                );
                false
            }
        });
        drop(channels);
        self.touch();
    }

    /// Idempotent: removing an id that is already gone does nothing.
    fn remove(&self, channel_id: Uuid) {
        self.channels
            .lock()
            .expect("channel lock poisoned")
            .retain(|channel| channel.id != channel_id);
    }

    /// Dropping the senders ends every subscriber's stream.
    fn close_all(&self) {
        self.channels.lock().expect("channel lock poisoned").clear();
    }

    fn len(&self) -> usize {
        self.channels.lock().expect("channel lock poisoned").len()
    }
}

/// A live subscription handle. The receiver yields the board's events in
/// publish order; when the group retires the stream simply ends.
pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::UnboundedReceiver<BoardStreamEvent>,
}

/// Registry of board id → broadcast group.
///
/// Owned by the server and handed around by cloning; constructed once at
/// startup and torn down with the process, not an ambient global.
#[derive(Clone)]
pub struct BroadcastRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    groups: RwLock<HashMap<Uuid, Arc<BoardGroup>>>,
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                groups: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a push channel for a board, creating the group on first use.
    /// Creation happens under the map's write lock, so two concurrent first
    /// subscribers still end up in one group.
    pub async fn subscribe(&self, board_id: Uuid) -> Subscription {
        let channel_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let group = {
            let mut groups = self.inner.groups.write().await;
            groups
                .entry(board_id)
                .or_insert_with(|| {
                    info!("Creating broadcast group for board {}", board_id);
                    Arc::new(BoardGroup::new())
                })
                .clone()
        };
        group.add(Channel { id: channel_id, tx });

        info!("Channel {} subscribed to board {}", channel_id, board_id);
        Subscription {
            id: channel_id,
            receiver: rx,
        }
    }

    /// Remove one channel from a board's group. Safe to call more than once;
    /// a disconnect and a timeout racing each other both land here.
    pub async fn unsubscribe(&self, board_id: Uuid, channel_id: Uuid) {
        let group = {
            let groups = self.inner.groups.read().await;
            groups.get(&board_id).cloned()
        };
        if let Some(group) = group {
            group.remove(channel_id);
        }
    }

    /// Best-effort multicast. No group means nobody is listening; a no-op.
    pub async fn publish(&self, board_id: Uuid, event: BoardStreamEvent) {
        let group = {
            let groups = self.inner.groups.read().await;
            groups.get(&board_id).cloned()
        };
        match group {
            Some(group) => group.send_all(board_id, &event),
            None => {}
        }
    }

    /// Force-close every channel of a board and drop the group.
    pub async fn retire(&self, board_id: Uuid) {
        let group = self.inner.groups.write().await.remove(&board_id);
        if let Some(group) = group {
            info!("Retiring broadcast group for board {}", board_id);
            group.close_all();
        }
    }

    /// Retire every group idle past `timeout`. The candidate scan holds no
    /// lock; each retirement re-checks idleness under the map's write lock so
    /// a freshly-active group survives the race.
    pub async fn retire_idle(&self, timeout: Duration) -> usize {
        let now = Instant::now();
        let snapshot: Vec<(Uuid, Arc<BoardGroup>)> = {
            let groups = self.inner.groups.read().await;
            groups.iter().map(|(id, group)| (*id, group.clone())).collect()
        };

        let mut retired = 0;
        for (board_id, group) in snapshot {
            if now.duration_since(group.idle_since()) < timeout {
                continue;
            }

            let removed = {
                let mut groups = self.inner.groups.write().await;
                let still_idle = groups
                    .get(&board_id)
                    .is_some_and(|g| now.duration_since(g.idle_since()) >= timeout);
                if still_idle {
                    groups.remove(&board_id)
                } else {
                    None
                }
            };

            if let Some(group) = removed {
                info!("Retiring idle broadcast group for board {}", board_id);
                group.close_all();
                retired += 1;
            }
        }
        retired
    }

    pub async fn group_count(&self) -> usize {
        self.inner.groups.read().await.len()
    }

    pub async fn subscriber_count(&self, board_id: Uuid) -> usize {
        let groups = self.inner.groups.read().await;
        groups.get(&board_id).map_or(0, |group| group.len())
    }
}

impl Default for BroadcastRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_types::events::EventAction;

    fn event(title: &str) -> BoardStreamEvent {
        BoardStreamEvent {
            entity: "Board",
            action: EventAction::Update,
            data: serde_json::json!({ "title": title }),
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_live_channel() {
        let registry = BroadcastRegistry::new();
        let board_id = Uuid::new_v4();

        let mut a = registry.subscribe(board_id).await;
        let mut b = registry.subscribe(board_id).await;

        registry.publish(board_id, event("hello")).await;

        assert_eq!(a.receiver.recv().await.unwrap().data["title"], "hello");
        assert_eq!(b.receiver.recv().await.unwrap().data["title"], "hello");
    }

    #[tokio::test]
    async fn dead_channel_is_pruned_and_the_rest_still_deliver() {
        let registry = BroadcastRegistry::new();
        let board_id = Uuid::new_v4();

        let dead = registry.subscribe(board_id).await;
        let mut live = registry.subscribe(board_id).await;
        let mut other = registry.subscribe(board_id).await;
        assert_eq!(registry.subscriber_count(board_id).await, 3);

        drop(dead.receiver);
        registry.publish(board_id, event("still here")).await;

        assert_eq!(live.receiver.recv().await.unwrap().data["title"], "still here");
        assert_eq!(other.receiver.recv().await.unwrap().data["title"], "still here");
        assert_eq!(registry.subscriber_count(board_id).await, 2);
    }

    #[tokio::test]
    async fn publish_without_listeners_is_a_noop() {
        let registry = BroadcastRegistry::new();
        registry.publish(Uuid::new_v4(), event("into the void")).await;
        assert_eq!(registry.group_count().await, 0);
    }

    #[tokio::test]
    async fn delivery_order_matches_publish_order_per_board() {
        let registry = BroadcastRegistry::new();
        let board_id = Uuid::new_v4();
        let mut sub = registry.subscribe(board_id).await;

        for i in 0..4 {
            registry.publish(board_id, event(&format!("v{i}"))).await;
        }

        for i in 0..4 {
            let got = sub.receiver.recv().await.unwrap();
            assert_eq!(got.data["title"], format!("v{i}"));
        }
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let registry = BroadcastRegistry::new();
        let board_id = Uuid::new_v4();

        let sub = registry.subscribe(board_id).await;
        let keep = registry.subscribe(board_id).await;

        registry.unsubscribe(board_id, sub.id).await;
        registry.unsubscribe(board_id, sub.id).await;

        assert_eq!(registry.subscriber_count(board_id).await, 1);
        drop(keep);
    }

    #[tokio::test]
    async fn retire_ends_every_subscriber_stream() {
        let registry = BroadcastRegistry::new();
        let board_id = Uuid::new_v4();
        let mut sub = registry.subscribe(board_id).await;

        registry.retire(board_id).await;

        assert!(sub.receiver.recv().await.is_none());
        assert_eq!(registry.group_count().await, 0);
    }
}
