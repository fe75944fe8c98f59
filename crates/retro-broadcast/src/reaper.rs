use std::time::Duration;

use tracing::info;

use crate::registry::BroadcastRegistry;

/// Timing knobs for the sweep. Injected rather than read from the
/// environment so tests can drive it with a paused clock.
#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    /// How often the sweep runs.
    pub sweep_interval: Duration,
    /// A group untouched for this long is retired.
    pub channel_timeout: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30 * 60),
            channel_timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Background task that retires idle broadcast groups.
///
/// A board whose viewers all went away without an explicit unsubscribe must
/// not keep its group forever. Runs until the process shuts down.
pub async fn run(registry: BroadcastRegistry, config: ReaperConfig) {
    let mut interval = tokio::time::interval(config.sweep_interval);

    loop {
        interval.tick().await;

        let retired = registry.retire_idle(config.channel_timeout).await;
        if retired > 0 {
            info!("Reaper: retired {} idle board groups", retired);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_types::events::{BoardStreamEvent, EventAction};
    use uuid::Uuid;

    #[tokio::test(start_paused = true)]
    async fn idle_group_is_retired_and_active_group_survives() {
        let registry = BroadcastRegistry::new();
        let config = ReaperConfig {
            sweep_interval: Duration::from_secs(30 * 60),
            channel_timeout: Duration::from_secs(10 * 60),
        };

        let idle_board = Uuid::new_v4();
        let busy_board = Uuid::new_v4();
        let mut idle_sub = registry.subscribe(idle_board).await;
        let _busy_sub = registry.subscribe(busy_board).await;

        tokio::spawn(run(registry.clone(), config));

        // Keep the busy board warm shortly before the sweep fires.
        tokio::time::sleep(Duration::from_secs(25 * 60)).await;
        registry
            .publish(
                busy_board,
                BoardStreamEvent {
                    entity: "Board",
                    action: EventAction::Update,
                    data: serde_json::json!({}),
                },
            )
            .await;

        // Past the 30-minute sweep: the idle board is gone, the busy one kept.
        tokio::time::sleep(Duration::from_secs(6 * 60)).await;

        assert_eq!(registry.group_count().await, 1);
        assert_eq!(registry.subscriber_count(busy_board).await, 1);
        assert!(idle_sub.receiver.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn group_active_within_timeout_is_not_touched() {
        let registry = BroadcastRegistry::new();
        let board_id = Uuid::new_v4();
        let _sub = registry.subscribe(board_id).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        let retired = registry.retire_idle(Duration::from_secs(10 * 60)).await;

        assert_eq!(retired, 0);
        assert_eq!(registry.subscriber_count(board_id).await, 1);
    }
}
