//! Tailer manager: one tailer task per live transcript, stamped on every
//! write event and evicted by a periodic sweeper once idle too long.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::handler::HandlerEvent;
use crate::tailer::SessionTailer;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct TailerEntry {
    cancel: CancellationToken,
    last_activity: Instant,
}

pub struct TailerManager {
    entries: Mutex<HashMap<PathBuf, TailerEntry>>,
    tx: mpsc::Sender<HandlerEvent>,
    cancel: CancellationToken,
    idle_timeout: Duration,
}

impl TailerManager {
    pub fn new(tx: mpsc::Sender<HandlerEvent>, cancel: CancellationToken) -> Self {
        Self::with_idle_timeout(tx, cancel, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(
        tx: mpsc::Sender<HandlerEvent>,
        cancel: CancellationToken,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            tx,
            cancel,
            idle_timeout,
        }
    }

    /// Start a tailer for `path` unless one is already running; either way
    /// the activity stamp is refreshed.
    pub fn ensure_tailer(&self, path: &Path) {
        let mut entries = self.lock_entries();

        if let Some(entry) = entries.get_mut(path) {
            entry.last_activity = Instant::now();
            return;
        }

        let token = self.cancel.child_token();
        let tailer = SessionTailer::new(path);
        let tx = self.tx.clone();
        let task_token = token.clone();
        let path_str = path.display().to_string();
        tokio::spawn(async move {
            if let Err(err) = tailer.follow(tx, task_token).await {
                tracing::warn!(path = %path_str, error = %err, "tailer stopped with error");
            }
        });

        tracing::debug!(path = %path.display(), "tailer started");
        entries.insert(
            path.to_path_buf(),
            TailerEntry {
                cancel: token,
                last_activity: Instant::now(),
            },
        );
    }

    /// Periodic eviction of tailers idle longer than the threshold.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let cancel = manager.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => manager.sweep(),
                    _ = cancel.cancelled() => return,
                }
            }
        })
    }

    pub fn sweep(&self) {
        let mut entries = self.lock_entries();
        let idle_timeout = self.idle_timeout;
        entries.retain(|path, entry| {
            if entry.last_activity.elapsed() < idle_timeout {
                return true;
            }
            entry.cancel.cancel();
            tracing::debug!(path = %path.display(), "idle tailer evicted");
            false
        });
    }

    /// Stop every managed tailer.
    pub fn stop(&self) {
        let mut entries = self.lock_entries();
        for entry in entries.values() {
            entry.cancel.cancel();
        }
        entries.clear();
    }

    pub fn active_count(&self) -> usize {
        self.lock_entries().len()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, TailerEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
