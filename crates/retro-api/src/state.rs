use std::sync::Arc;
use std::time::Duration;

use retro_broadcast::BroadcastRegistry;
use retro_db::Database;
use retro_log::EventLog;

pub type AppState = Arc<AppStateInner>;

/// Everything the handlers need, wired once at startup.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub log: Arc<dyn EventLog>,
    pub registry: BroadcastRegistry,
    pub jwt_secret: String,
    /// Bounded lifetime of one push channel.
    pub sse_timeout: Duration,
}
