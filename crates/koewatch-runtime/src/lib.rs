//! Runtime for koewatch: transcript tailing and file lifecycle, the event
//! handler with replay buffering and Task correlation, the feed formatter,
//! and the notification-log follower.

mod broadcast;
mod config;
mod follower;
mod formatter;
mod handler;
mod manager;
mod tailer;
mod watcher;

pub use broadcast::{Broadcast, BroadcastMessage, BroadcastMetadata};
pub use config::{default_notification_log, default_projects_root, resolve_api_key, Config};
pub use follower::NotificationFollower;
pub use formatter::{parse_permission_message, Formatter, RenderedBlock};
pub use handler::{
    EventHandler, HandlerEvent, TaskInfo, DEFAULT_BUFFER_TIMEOUT, MAILBOX_CAPACITY,
};
pub use manager::{TailerManager, DEFAULT_IDLE_TIMEOUT, DEFAULT_SWEEP_INTERVAL};
pub use tailer::SessionTailer;
pub use watcher::{ProjectsWatcher, WatchFilters};
