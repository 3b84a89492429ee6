//! Priority speech queue: FIFO buffer with a priority-aware skip rule. Items
//! dequeue oldest-first; an item is skipped iff something still buffered has
//! strictly higher priority. The queue is unbounded by design — suppression,
//! not rejection, sheds speech load.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Priority classes, low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    ToolUse = 0,
    ToolUseMcp = 1,
    ToolUsePermission = 2,
    Notification = 3,
    Text = 4,
}

#[derive(Debug, Clone)]
pub struct SpeechItem {
    pub id: u64,
    pub text: String,
    pub priority: Priority,
    pub enqueued_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<SpeechItem>,
    closed: bool,
    next_id: u64,
}

#[derive(Debug)]
pub struct QueueMetrics {
    queued: AtomicU64,
    skipped: AtomicU64,
    played: AtomicU64,
    errors: AtomicU64,
    started_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub queued: u64,
    pub skipped: u64,
    pub played: u64,
    pub errors: u64,
    pub uptime: Duration,
    pub skip_rate: f64,
}

impl QueueMetrics {
    fn new() -> Self {
        Self {
            queued: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            played: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn mark_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_played(&self) {
        self.played.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let queued = self.queued.load(Ordering::Relaxed);
        let skipped = self.skipped.load(Ordering::Relaxed);
        MetricsSnapshot {
            queued,
            skipped,
            played: self.played.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            skip_rate: if queued == 0 {
                0.0
            } else {
                skipped as f64 / queued as f64
            },
        }
    }
}

pub struct SpeechQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    metrics: QueueMetrics,
}

impl SpeechQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            metrics: QueueMetrics::new(),
        }
    }

    /// Buffer an item. Returns its id, or `None` once the queue is closed —
    /// the only condition under which an enqueue is refused.
    pub fn enqueue(&self, text: impl Into<String>, priority: Priority) -> Option<u64> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.closed {
            return None;
        }

        let id = state.next_id;
        state.next_id += 1;
        state.items.push_back(SpeechItem {
            id,
            text: text.into(),
            priority,
            enqueued_at: Instant::now(),
        });
        self.metrics.queued.fetch_add(1, Ordering::Relaxed);
        drop(state);

        self.notify.notify_one();
        Some(id)
    }

    /// Wait for the oldest buffered item. Returns `None` when the queue is
    /// closed and drained, or when the token is cancelled.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<SpeechItem> {
        loop {
            {
                let mut state = match self.state.lock() {
                    Ok(state) => state,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// An item should be skipped iff any item still buffered has strictly
    /// higher priority.
    pub fn should_skip(&self, item: &SpeechItem) -> bool {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.items.iter().any(|other| other.priority > item.priority)
    }

    /// Stop admitting items and wake every waiter; buffered items may still
    /// be drained.
    pub fn close(&self) {
        {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.closed = true;
        }
        self.notify.notify_one();
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        match self.state.lock() {
            Ok(state) => state.items.len(),
            Err(poisoned) => poisoned.into_inner().items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }
}

impl Default for SpeechQueue {
    fn default() -> Self {
        Self::new()
    }
}
