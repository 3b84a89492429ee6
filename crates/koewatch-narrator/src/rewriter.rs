use async_trait::async_trait;
use serde_json::Value;

/// Result of one narration attempt. `Fallback` means the rewriter declines
/// and the chain should try the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Narration {
    Utterance(String),
    Fallback,
}

impl Narration {
    pub fn utterance(text: impl Into<String>) -> Self {
        Self::Utterance(text.into())
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback)
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Utterance(text) => Some(text),
            Self::Fallback => None,
        }
    }
}

/// Notification subtype handed to the narrator. The formatter reduces raw
/// hook-log records to one of these before asking for an utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    SessionStart { source: Option<String> },
    PreCompact { trigger: Option<String> },
    Stop,
    Message(String),
}

/// One narrator in the chain. Every operation may decline by returning
/// `Narration::Fallback`; none may panic on empty input.
#[async_trait]
pub trait Rewriter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn narrate_tool_use(&self, tool: &str, input: &Value) -> Narration;

    async fn narrate_tool_use_permission(&self, tool: &str) -> Narration;

    /// `is_thinking` selects future-oriented phrasing for reasoning streams.
    async fn narrate_text(&self, text: &str, is_thinking: bool) -> Narration;

    async fn narrate_notification(&self, kind: &NotificationKind) -> Narration;

    async fn narrate_task_completion(
        &self,
        subagent_type: Option<&str>,
        description: Option<&str>,
    ) -> Narration;
}
