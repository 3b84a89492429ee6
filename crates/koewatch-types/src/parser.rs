use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

use crate::event::{
    AssistantEvent, EventMeta, HookEvent, SummaryEvent, SystemEvent, SystemLevel, TranscriptEvent,
    UserEvent,
};
use crate::hook::parse_hook_line;
use crate::record::{AssistantRecord, RecordMeta, SummaryRecord, SystemRecord, UserRecord};
use crate::session::SessionIdentity;

/// Stateless per-line decoder. The parser holds the transcript's identity so
/// every decoded event is stamped with its project/session pair.
#[derive(Debug, Clone)]
pub struct EventParser {
    identity: SessionIdentity,
}

impl EventParser {
    pub fn new(path: &Path) -> Self {
        let identity =
            SessionIdentity::from_transcript_path(path).unwrap_or_else(SessionIdentity::unknown);
        Self { identity }
    }

    pub fn with_identity(identity: SessionIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Decode one JSON line into a typed event, dispatching on the top-level
    /// `type` tag. Unknown tags yield a base event rather than an error.
    pub fn parse_line(&self, line: &str) -> Result<TranscriptEvent> {
        let value: Value =
            serde_json::from_str(line.trim()).context("transcript line is not valid JSON")?;
        let record_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();

        match record_type.as_str() {
            "user" => {
                let record: UserRecord =
                    serde_json::from_value(value).context("malformed user record")?;
                Ok(TranscriptEvent::User(UserEvent {
                    meta: EventMeta::from_record(record.meta, &record_type, self.identity.clone()),
                    message: record.message,
                    is_meta: record.is_meta,
                }))
            }
            "assistant" => {
                let record: AssistantRecord =
                    serde_json::from_value(value).context("malformed assistant record")?;
                Ok(TranscriptEvent::Assistant(AssistantEvent {
                    meta: EventMeta::from_record(record.meta, &record_type, self.identity.clone()),
                    message: record.message,
                }))
            }
            "system" => {
                let record: SystemRecord =
                    serde_json::from_value(value).context("malformed system record")?;
                Ok(self.build_system_event(record, &record_type))
            }
            "summary" => {
                let record: SummaryRecord =
                    serde_json::from_value(value).context("malformed summary record")?;
                Ok(TranscriptEvent::Summary(SummaryEvent {
                    identity: self.identity.clone(),
                    summary: record.summary,
                    leaf_uuid: record.leaf_uuid,
                }))
            }
            _ => {
                let meta: RecordMeta = serde_json::from_value(value).unwrap_or_default();
                Ok(TranscriptEvent::Other(EventMeta::from_record(
                    meta,
                    &record_type,
                    self.identity.clone(),
                )))
            }
        }
    }

    /// A system record is a hook candidate only when `toolUseID`, `level` and
    /// `content` are all present and non-empty.
    fn build_system_event(&self, record: SystemRecord, record_type: &str) -> TranscriptEvent {
        let content = record.content.clone().unwrap_or_default();
        let level = record.level.as_deref().and_then(SystemLevel::parse);

        let is_hook_candidate = record
            .tool_use_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
            && record.level.as_deref().is_some_and(|l| !l.is_empty())
            && !content.is_empty();

        if is_hook_candidate {
            if let Some(hook) = parse_hook_line(&content) {
                let hook_name = hook.hook_name();
                return TranscriptEvent::Hook(HookEvent {
                    meta: EventMeta::from_record(record.meta, record_type, self.identity.clone()),
                    event_type: hook.event_type,
                    command: hook.command,
                    status: hook.status,
                    hook_name,
                    level,
                });
            }
        }

        TranscriptEvent::System(SystemEvent {
            meta: EventMeta::from_record(record.meta, record_type, self.identity.clone()),
            content,
            level,
            is_meta: record.is_meta,
        })
    }
}
