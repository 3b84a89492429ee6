//! Feed formatter: renders one typed event to a newline-terminated text
//! block, asks the narrator chain for an utterance per significant sub-item
//! and enqueues normalized speech while doing so.

use chrono::{DateTime, Local, Utc};
use owo_colors::OwoColorize;
use serde_json::Value;
use std::sync::Arc;

use koewatch_narrator::{normalize_for_speech, parse_mcp_name, NarratorChain, NotificationKind};
use koewatch_speech::{Priority, SpeechQueue};
use koewatch_types::{
    AssistantContent, AssistantEvent, EventMeta, HookEvent, NotificationEvent, SummaryEvent,
    SystemEvent, SystemLevel, TaskCompletionEvent, TranscriptEvent, UserContent, UserEvent,
};

const USER_TEXT_MAX_LINES: usize = 3;
const ASSISTANT_TEXT_MAX_LINES: usize = 30;
const PERMISSION_PREFIX: &str = "Claude needs your permission to use ";
const MCP_SUFFIX: &str = " (MCP)";

/// One rendered feed block plus the metadata the broadcast surface wants.
#[derive(Debug, Clone)]
pub struct RenderedBlock {
    /// Newline-terminated text, ready for stdout.
    pub text: String,
    pub event_type: String,
    pub tool_name: Option<String>,
    pub session: String,
}

pub struct Formatter {
    narrator: Arc<NarratorChain>,
    speech: Option<Arc<SpeechQueue>>,
    debug: bool,
}

impl Formatter {
    pub fn new(narrator: Arc<NarratorChain>, speech: Option<Arc<SpeechQueue>>, debug: bool) -> Self {
        Self {
            narrator,
            speech,
            debug,
        }
    }

    /// Render a transcript event. `None` means the event is suppressed.
    pub async fn render(&self, event: &TranscriptEvent) -> Option<RenderedBlock> {
        match event {
            TranscriptEvent::User(user) => Some(self.render_user(user)),
            TranscriptEvent::Assistant(assistant) => Some(self.render_assistant(assistant).await),
            TranscriptEvent::Hook(hook) => Some(self.render_hook(hook)),
            TranscriptEvent::System(system) => self.render_system(system),
            TranscriptEvent::Summary(summary) => Some(self.render_summary(summary)),
            TranscriptEvent::TaskCompletion(completion) => {
                Some(self.render_task_completion(completion).await)
            }
            TranscriptEvent::Other(meta) => Some(self.render_unknown(meta)),
        }
    }

    fn render_user(&self, user: &UserEvent) -> RenderedBlock {
        let mut lines = vec![format!("{} 👤 User", timestamp(user.meta.timestamp))];

        for item in &user.message.content {
            match item {
                UserContent::Text { text } => {
                    push_truncated(&mut lines, text, USER_TEXT_MAX_LINES);
                }
                UserContent::ToolResult {
                    tool_use_id,
                    is_error,
                    ..
                } => {
                    let glyph = if *is_error { "❌" } else { "✅" };
                    lines.push(format!("  Tool Result: {} {}", tool_use_id, glyph));
                }
                UserContent::Unknown => {}
            }
        }

        block(lines, "user", None, &user.meta)
    }

    async fn render_assistant(&self, assistant: &AssistantEvent) -> RenderedBlock {
        let mut lines = vec![format!(
            "{} 🤖 Assistant ({})",
            timestamp(assistant.meta.timestamp),
            assistant.message.model.cyan()
        )];

        let mut file_ops: Vec<String> = Vec::new();
        let mut first_tool: Option<String> = None;

        for item in &assistant.message.content {
            match item {
                AssistantContent::Text { text } => {
                    let narration = self.narrator.narrate_text(text, false).await;
                    self.speak(&narration, Priority::Text);
                    push_display_text(&mut lines, text, "");
                }
                AssistantContent::Thinking { thinking } => {
                    let narration = self.narrator.narrate_text(thinking, true).await;
                    self.speak(&narration, Priority::Text);
                    push_display_text(&mut lines, thinking, "💭 ");
                }
                AssistantContent::ToolUse { name, input, .. } => {
                    let input = shape_tool_input(name, input, assistant.meta.cwd.as_deref());
                    let narration = self.narrator.narrate_tool_use(name, &input).await;
                    let priority = if parse_mcp_name(name).is_some() {
                        Priority::ToolUseMcp
                    } else {
                        Priority::ToolUse
                    };
                    self.speak(&narration, priority);
                    lines.push(format!("  🔧 {}: {}", name, narration));

                    if first_tool.is_none() {
                        first_tool = Some(name.clone());
                    }
                    if matches!(name.as_str(), "Read" | "Write" | "Edit" | "MultiEdit") {
                        if let Some(path) = input.get("file_path").and_then(|p| p.as_str()) {
                            file_ops.push(path.to_string());
                        }
                    }
                }
                AssistantContent::Unknown => {}
            }
        }

        if !file_ops.is_empty() {
            lines.push(format!("  📁 Files: {}", file_ops.join(", ")));
        }

        if let Some(usage) = &assistant.message.usage {
            if usage.output_tokens > 0 {
                lines.push(format!(
                    "  📊 Tokens: in={} out={} cache_read={} cache_create={}",
                    usage.input_tokens,
                    usage.output_tokens,
                    usage.cache_read_input_tokens.unwrap_or(0),
                    usage.cache_creation_input_tokens.unwrap_or(0),
                ));
            }
        }

        block(lines, "assistant", first_tool, &assistant.meta)
    }

    fn render_hook(&self, hook: &HookEvent) -> RenderedBlock {
        let glyph = hook.level.map(|l| l.glyph()).unwrap_or("ℹ️");
        let lines = vec![
            format!(
                "{} 🪝 {} [{}]",
                timestamp(hook.meta.timestamp),
                hook.event_type,
                hook.hook_name
            ),
            format!("  {} {}", glyph, hook.status),
        ];
        block(lines, "hook", None, &hook.meta)
    }

    fn render_system(&self, system: &SystemEvent) -> Option<RenderedBlock> {
        if system.is_meta && !self.debug {
            return None;
        }

        let glyph = system.level.map(|l| l.glyph()).unwrap_or("ℹ️");
        let content = match system.level {
            Some(SystemLevel::Error) => system.content.red().to_string(),
            Some(SystemLevel::Warning) => system.content.yellow().to_string(),
            _ => system.content.clone(),
        };
        let lines = vec![
            format!("{} ⚙️ System", timestamp(system.meta.timestamp)),
            format!("  {} {}", glyph, content),
        ];
        Some(block(lines, "system", None, &system.meta))
    }

    fn render_summary(&self, summary: &SummaryEvent) -> RenderedBlock {
        RenderedBlock {
            text: format!("📝 Summary: {}\n", summary.summary),
            event_type: "summary".to_string(),
            tool_name: None,
            session: summary.identity.session.clone(),
        }
    }

    async fn render_task_completion(&self, completion: &TaskCompletionEvent) -> RenderedBlock {
        let narration = self
            .narrator
            .narrate_task_completion(
                completion.subagent_type.as_deref(),
                Some(completion.description.as_str()).filter(|d| !d.is_empty()),
            )
            .await;
        self.speak(&narration, Priority::Notification);

        let lines = vec![format!(
            "{} 🏁 {}",
            timestamp(completion.meta.timestamp),
            narration
        )];
        block(lines, "task_completion", None, &completion.meta)
    }

    fn render_unknown(&self, meta: &EventMeta) -> RenderedBlock {
        let tag = if meta.record_type.is_empty() {
            "untyped"
        } else {
            meta.record_type.as_str()
        };
        let lines = vec![format!("{} ❓ Unknown event ({})", timestamp(meta.timestamp), tag)];
        block(lines, "unknown", None, meta)
    }

    /// Render one hook-log record, dispatching on its event name.
    pub async fn render_notification(&self, event: &NotificationEvent) -> Option<RenderedBlock> {
        let session = event.session_id.clone().unwrap_or_else(|| "unknown".to_string());
        let now = timestamp(None);

        let (lines, tool_name) = match event.hook_event_name.as_str() {
            "PreCompact" => {
                let kind = NotificationKind::PreCompact {
                    trigger: event.trigger.clone(),
                };
                let narration = self.narrator.narrate_notification(&kind).await;
                self.speak(&narration, Priority::Notification);
                (vec![format!("{} 🗜️ PreCompact: {}", now, narration)], None)
            }
            "SessionStart" => {
                let kind = NotificationKind::SessionStart {
                    source: event.source.clone(),
                };
                let narration = self.narrator.narrate_notification(&kind).await;
                self.speak(&narration, Priority::Notification);
                let source = event.source.as_deref().unwrap_or("unknown");
                (
                    vec![format!("{} 🚀 SessionStart({}): {}", now, source, narration)],
                    None,
                )
            }
            "Stop" => {
                let narration = self.narrator.narrate_notification(&NotificationKind::Stop).await;
                self.speak(&narration, Priority::Notification);
                (vec![format!("{} 🛑 Stop: {}", now, narration)], None)
            }
            "Notification" => {
                let message = event.message.clone().unwrap_or_default();
                if let Some(tool) = parse_permission_message(&message) {
                    let narration = self.narrator.narrate_tool_use_permission(&tool).await;
                    self.speak(&narration, Priority::ToolUsePermission);
                    (
                        vec![format!("{} 🔐 Permission: {}", now, narration)],
                        Some(tool),
                    )
                } else {
                    let kind = NotificationKind::Message(message.clone());
                    let narration = self.narrator.narrate_notification(&kind).await;
                    self.speak(&narration, Priority::Notification);
                    (
                        vec![format!("{} {} {}", now, message_emoji(&message), message)],
                        None,
                    )
                }
            }
            other => (vec![format!("{} 🔔 {}", now, other)], None),
        };

        let mut text = lines.join("\n");
        text.push('\n');
        Some(RenderedBlock {
            text,
            event_type: "notification".to_string(),
            tool_name,
            session,
        })
    }

    fn speak(&self, narration: &str, priority: Priority) {
        let Some(queue) = &self.speech else { return };
        let normalized = normalize_for_speech(narration);
        if normalized.is_empty() {
            return;
        }
        if queue.enqueue(normalized, priority).is_none() {
            tracing::debug!("speech queue is closed; utterance dropped");
        }
    }
}

/// `"Claude needs your permission to use <tool>"` → the tool name, with the
/// `" (MCP)"` suffix removed and `"<server> - <op>"` reassembled to
/// `mcp__<server>__<op>`.
pub fn parse_permission_message(message: &str) -> Option<String> {
    let rest = message.strip_prefix(PERMISSION_PREFIX)?;
    let rest = rest.strip_suffix(MCP_SUFFIX).unwrap_or(rest).trim();
    if rest.is_empty() {
        return None;
    }
    if let Some((server, operation)) = rest.split_once(" - ") {
        return Some(format!("mcp__{}__{}", server.trim(), operation.trim()));
    }
    Some(rest.to_string())
}

fn message_emoji(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("waiting") {
        "⏳"
    } else if lower.contains("error") || lower.contains("failed") {
        "❌"
    } else if lower.contains("success") || lower.contains("completed") {
        "✅"
    } else {
        "🔔"
    }
}

/// Search-tool paths read better relative to the working directory, as long
/// as stripping the prefix never escapes it.
fn shape_tool_input(tool: &str, input: &Value, cwd: Option<&str>) -> Value {
    if !matches!(tool, "Grep" | "Glob" | "LS") {
        return input.clone();
    }
    let (Some(cwd), Some(path)) = (cwd, input.get("path").and_then(|p| p.as_str())) else {
        return input.clone();
    };

    let relative = match std::path::Path::new(path).strip_prefix(cwd) {
        Ok(stripped) => stripped.to_string_lossy().into_owned(),
        Err(_) => return input.clone(),
    };
    let relative = if relative.is_empty() {
        ".".to_string()
    } else {
        relative
    };

    let mut shaped = input.clone();
    if let Some(map) = shaped.as_object_mut() {
        map.insert("path".to_string(), Value::String(relative));
    }
    shaped
}

fn timestamp(ts: Option<DateTime<Utc>>) -> String {
    let local = ts
        .map(|t| t.with_timezone(&Local))
        .unwrap_or_else(Local::now);
    format!("[{}]", local.format("%H:%M:%S"))
}

fn push_truncated(lines: &mut Vec<String>, text: &str, max: usize) {
    let all: Vec<&str> = text.lines().collect();
    for line in all.iter().take(max) {
        lines.push(format!("  {}", line));
    }
    if all.len() > max {
        lines.push("  ...".to_string());
    }
}

/// Assistant text display rule: a single line is suppressed, longer blocks
/// show up to the cap.
fn push_display_text(lines: &mut Vec<String>, text: &str, prefix: &str) {
    let all: Vec<&str> = text.lines().collect();
    if all.len() <= 1 {
        return;
    }
    for (index, line) in all.iter().take(ASSISTANT_TEXT_MAX_LINES).enumerate() {
        if index == 0 {
            lines.push(format!("  {}{}", prefix, line));
        } else {
            lines.push(format!("  {}", line));
        }
    }
    if all.len() > ASSISTANT_TEXT_MAX_LINES {
        lines.push("  ...".to_string());
    }
}

fn block(
    lines: Vec<String>,
    event_type: &str,
    tool_name: Option<String>,
    meta: &EventMeta,
) -> RenderedBlock {
    let mut text = lines.join("\n");
    text.push('\n');
    RenderedBlock {
        text,
        event_type: event_type.to_string(),
        tool_name,
        session: meta.identity.session.clone(),
    }
}
