//! Event handler: the single consumer of the event mailbox. Applies
//! session-replay buffering, drops sidechain events, correlates Task tool
//! calls with their results and hands survivors to the formatter.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use koewatch_types::{
    AssistantContent, NotificationEvent, TaskCompletionEvent, TranscriptEvent, UserContent,
};

use crate::broadcast::{Broadcast, BroadcastMessage};
use crate::formatter::{Formatter, RenderedBlock};

/// Mailbox depth; producers block when the handler falls behind.
pub const MAILBOX_CAPACITY: usize = 100;

pub const DEFAULT_BUFFER_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything the handler consumes, from tailers and the hook-log follower.
#[derive(Debug, Clone)]
pub enum HandlerEvent {
    Transcript(TranscriptEvent),
    Notification(NotificationEvent),
}

/// Pending `Task` tool call awaiting its result.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub description: String,
    pub subagent_type: Option<String>,
}

struct SessionBuffer {
    generation: u64,
    events: Vec<TranscriptEvent>,
    created_at: Instant,
    timer: tokio::task::JoinHandle<()>,
}

type BufferTable = Arc<Mutex<HashMap<String, SessionBuffer>>>;
type TaskTable = Arc<Mutex<HashMap<String, TaskInfo>>>;

pub struct EventHandler {
    rx: mpsc::Receiver<HandlerEvent>,
    formatter: Formatter,
    buffers: BufferTable,
    tasks: TaskTable,
    broadcast: Option<Arc<dyn Broadcast>>,
    buffer_timeout: Duration,
    buffer_generation: u64,
}

impl EventHandler {
    pub fn new(
        rx: mpsc::Receiver<HandlerEvent>,
        formatter: Formatter,
        broadcast: Option<Arc<dyn Broadcast>>,
    ) -> Self {
        Self::with_buffer_timeout(rx, formatter, broadcast, DEFAULT_BUFFER_TIMEOUT)
    }

    pub fn with_buffer_timeout(
        rx: mpsc::Receiver<HandlerEvent>,
        formatter: Formatter,
        broadcast: Option<Arc<dyn Broadcast>>,
        buffer_timeout: Duration,
    ) -> Self {
        Self {
            rx,
            formatter,
            buffers: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            broadcast,
            buffer_timeout,
            buffer_generation: 0,
        }
    }

    /// Consume until cancellation, then drain whatever is still mailboxed.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.rx.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => return,
                },
            }
        }

        self.rx.close();
        while let Ok(event) = self.rx.try_recv() {
            self.handle(event).await;
        }
    }

    pub async fn handle(&mut self, event: HandlerEvent) {
        match event {
            HandlerEvent::Transcript(event) => self.handle_transcript(event).await,
            HandlerEvent::Notification(event) => self.handle_notification(event).await,
        }
    }

    async fn handle_transcript(&mut self, event: TranscriptEvent) {
        // A resume hook releases the session's replay buffer; the buffered
        // events are discarded and the hook itself is processed normally,
        // bypassing the buffering clause below.
        let is_resume_hook = matches!(
            &event,
            TranscriptEvent::Hook(hook)
                if hook.event_type == "SessionStart:resume" && !hook.meta.is_sidechain
        );
        if is_resume_hook {
            if let TranscriptEvent::Hook(hook) = &event {
                self.release_buffer(&hook.meta.identity.session);
            }
        } else if self.buffer_if_needed(&event) {
            return;
        }

        if event.is_sidechain() {
            return;
        }

        if let TranscriptEvent::Assistant(assistant) = &event {
            self.track_tasks(assistant);
        }

        if let TranscriptEvent::User(user) = &event {
            let completions = self.correlate_tasks(user);
            for completion in completions {
                self.render_and_emit(&TranscriptEvent::TaskCompletion(completion))
                    .await;
            }
        }

        self.render_and_emit(&event).await;
    }

    async fn handle_notification(&mut self, event: NotificationEvent) {
        if let Some(block) = self.formatter.render_notification(&event).await {
            self.emit(block).await;
        }
    }

    /// Replay suppression. A root event (null parent, non-sidechain) opens a
    /// buffer for its session; everything buffered is consumed and later
    /// discarded, never rendered.
    fn buffer_if_needed(&mut self, event: &TranscriptEvent) -> bool {
        let Some(meta) = event.meta() else {
            return false;
        };
        if meta.is_sidechain {
            return false;
        }
        let session = meta.identity.session.clone();

        let mut buffers = lock(&self.buffers);
        if let Some(buffer) = buffers.get_mut(&session) {
            buffer.events.push(event.clone());
            return true;
        }

        if meta.parent_uuid.is_none() {
            self.buffer_generation += 1;
            let generation = self.buffer_generation;
            let timer = self.spawn_buffer_timer(session.clone(), generation);
            buffers.insert(
                session,
                SessionBuffer {
                    generation,
                    events: vec![event.clone()],
                    created_at: Instant::now(),
                    timer,
                },
            );
            return true;
        }

        false
    }

    fn spawn_buffer_timer(&self, session: String, generation: u64) -> tokio::task::JoinHandle<()> {
        let buffers = self.buffers.clone();
        let timeout = self.buffer_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut table = lock(&buffers);
            let expired = table
                .get(&session)
                .is_some_and(|buffer| buffer.generation == generation);
            if expired {
                if let Some(buffer) = table.remove(&session) {
                    tracing::debug!(
                        session = %session,
                        discarded = buffer.events.len(),
                        age_ms = buffer.created_at.elapsed().as_millis() as u64,
                        "session buffer expired; replayed history discarded"
                    );
                }
            }
        })
    }

    fn release_buffer(&mut self, session: &str) {
        let mut buffers = lock(&self.buffers);
        if let Some(buffer) = buffers.remove(session) {
            buffer.timer.abort();
            tracing::debug!(
                session = %session,
                discarded = buffer.events.len(),
                "session resumed; replayed history discarded"
            );
        }
    }

    fn track_tasks(&self, assistant: &koewatch_types::AssistantEvent) {
        for item in &assistant.message.content {
            if let AssistantContent::ToolUse { id, name, input } = item {
                if name != "Task" {
                    continue;
                }
                let description = input
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or("")
                    .to_string();
                let subagent_type = input
                    .get("subagent_type")
                    .and_then(|s| s.as_str())
                    .map(|s| s.to_string());
                lock(&self.tasks).insert(
                    id.clone(),
                    TaskInfo {
                        description,
                        subagent_type,
                    },
                );
            }
        }
    }

    /// Tool results that close a tracked Task become synthesized completion
    /// events, rendered before the user event itself.
    fn correlate_tasks(&self, user: &koewatch_types::UserEvent) -> Vec<TaskCompletionEvent> {
        let mut completions = Vec::new();
        for item in &user.message.content {
            if let UserContent::ToolResult { tool_use_id, .. } = item {
                let info = lock(&self.tasks).remove(tool_use_id);
                if let Some(info) = info {
                    completions.push(TaskCompletionEvent {
                        meta: user.meta.clone(),
                        description: info.description,
                        subagent_type: info.subagent_type,
                    });
                }
            }
        }
        completions
    }

    async fn render_and_emit(&self, event: &TranscriptEvent) {
        if let Some(block) = self.formatter.render(event).await {
            self.emit(block).await;
        }
    }

    async fn emit(&self, block: RenderedBlock) {
        {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(block.text.as_bytes());
            let _ = stdout.flush();
        }

        if let Some(broadcast) = &self.broadcast {
            let message = BroadcastMessage::new(
                block.text.clone(),
                &block.event_type,
                block.tool_name.clone(),
                &block.session,
            );
            broadcast.send(message).await;
        }
    }

    pub fn task_table(&self) -> TaskTable {
        self.tasks.clone()
    }

    pub fn buffered_sessions(&self) -> usize {
        lock(&self.buffers).len()
    }
}

fn lock<T>(mutex: &Arc<Mutex<T>>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
