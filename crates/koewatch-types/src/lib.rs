//! Core types for koewatch: the transcript record schema, the typed event
//! model built from it, and the per-line parser that stamps session identity.

mod event;
mod hook;
mod notification;
mod parser;
mod record;
mod session;

pub use event::{
    AssistantEvent, EventMeta, HookEvent, SummaryEvent, SystemEvent, SystemLevel,
    TaskCompletionEvent, TranscriptEvent, UserEvent,
};
pub use hook::{parse_hook_line, strip_ansi, HookLine};
pub use notification::NotificationEvent;
pub use parser::EventParser;
pub use record::{
    AssistantContent, AssistantMessage, AssistantRecord, RecordMeta, SummaryRecord, SystemRecord,
    TokenUsage, UserContent, UserMessage, UserRecord,
};
pub use session::SessionIdentity;
