//! Per-board multicast of push events to live subscribers, plus the periodic
//! reaper that retires idle groups.

pub mod reaper;
pub mod registry;

pub use reaper::ReaperConfig;
pub use registry::{BroadcastRegistry, Subscription};
