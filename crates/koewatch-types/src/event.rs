use chrono::{DateTime, Utc};

use crate::record::{AssistantMessage, RecordMeta, UserMessage};
use crate::session::SessionIdentity;

/// Common fields carried by every transcript event, plus the identity the
/// parser derives from the transcript path.
#[derive(Debug, Clone)]
pub struct EventMeta {
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
    pub is_sidechain: bool,
    pub user_type: Option<String>,
    pub cwd: Option<String>,
    pub session_id: Option<String>,
    pub version: Option<String>,
    pub git_branch: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Raw top-level `type` tag as written on disk.
    pub record_type: String,
    pub identity: SessionIdentity,
}

impl EventMeta {
    pub fn from_record(meta: RecordMeta, record_type: &str, identity: SessionIdentity) -> Self {
        let timestamp = meta
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Self {
            uuid: meta.uuid,
            parent_uuid: meta.parent_uuid,
            is_sidechain: meta.is_sidechain,
            user_type: meta.user_type,
            cwd: meta.cwd,
            session_id: meta.session_id,
            version: meta.version,
            git_branch: meta.git_branch,
            timestamp,
            record_type: record_type.to_string(),
            identity,
        }
    }
}

/// Severity tag on system records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemLevel {
    Info,
    Warning,
    Error,
    Debug,
}

impl SystemLevel {
    pub fn parse(level: &str) -> Option<Self> {
        match level {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Info => "ℹ️",
            Self::Warning => "⚠️",
            Self::Error => "❌",
            Self::Debug => "🐛",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserEvent {
    pub meta: EventMeta,
    pub message: UserMessage,
    pub is_meta: bool,
}

#[derive(Debug, Clone)]
pub struct AssistantEvent {
    pub meta: EventMeta,
    pub message: AssistantMessage,
}

#[derive(Debug, Clone)]
pub struct SystemEvent {
    pub meta: EventMeta,
    pub content: String,
    pub level: Option<SystemLevel>,
    pub is_meta: bool,
}

/// System record whose content matched the hook shape.
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub meta: EventMeta,
    /// `Stop`, `SessionStart:resume`, ...
    pub event_type: String,
    pub command: String,
    pub status: String,
    /// Basename of the hook command path.
    pub hook_name: String,
    pub level: Option<SystemLevel>,
}

/// Session-wide summary; carries no parent linkage.
#[derive(Debug, Clone)]
pub struct SummaryEvent {
    pub identity: SessionIdentity,
    pub summary: String,
    pub leaf_uuid: Option<String>,
}

/// Synthesized by the event handler when a user tool result closes an
/// earlier `Task` tool call. Never present on disk.
#[derive(Debug, Clone)]
pub struct TaskCompletionEvent {
    pub meta: EventMeta,
    pub description: String,
    pub subagent_type: Option<String>,
}

#[derive(Debug, Clone)]
pub enum TranscriptEvent {
    User(UserEvent),
    Assistant(AssistantEvent),
    System(SystemEvent),
    Hook(HookEvent),
    Summary(SummaryEvent),
    TaskCompletion(TaskCompletionEvent),
    /// Unknown top-level `type`; only the common fields are retained.
    Other(EventMeta),
}

impl TranscriptEvent {
    pub fn meta(&self) -> Option<&EventMeta> {
        match self {
            Self::User(e) => Some(&e.meta),
            Self::Assistant(e) => Some(&e.meta),
            Self::System(e) => Some(&e.meta),
            Self::Hook(e) => Some(&e.meta),
            Self::TaskCompletion(e) => Some(&e.meta),
            Self::Summary(_) => None,
            Self::Other(meta) => Some(meta),
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        match self {
            Self::User(e) => &e.meta.identity,
            Self::Assistant(e) => &e.meta.identity,
            Self::System(e) => &e.meta.identity,
            Self::Hook(e) => &e.meta.identity,
            Self::TaskCompletion(e) => &e.meta.identity,
            Self::Summary(e) => &e.identity,
            Self::Other(meta) => &meta.identity,
        }
    }

    pub fn is_sidechain(&self) -> bool {
        self.meta().map(|m| m.is_sidechain).unwrap_or(false)
    }

    pub fn parent_uuid(&self) -> Option<&str> {
        self.meta().and_then(|m| m.parent_uuid.as_deref())
    }

    pub fn uuid(&self) -> Option<&str> {
        self.meta().and_then(|m| m.uuid.as_deref())
    }

    pub fn record_type(&self) -> &str {
        match self {
            Self::Summary(_) => "summary",
            Self::User(e) => &e.meta.record_type,
            Self::Assistant(e) => &e.meta.record_type,
            Self::System(e) => &e.meta.record_type,
            Self::Hook(e) => &e.meta.record_type,
            Self::TaskCompletion(e) => &e.meta.record_type,
            Self::Other(meta) => &meta.record_type,
        }
    }
}
