use serde::{Deserialize, Serialize};

/// One record of the out-of-band hook-notification log. Written by the
/// agent's hook runner as JSON lines; carries no parent linkage.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationEvent {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    /// `SessionStart`, `PreCompact`, `Notification` or `Stop`.
    pub hook_event_name: String,
    /// `startup`, `clear`, `resume` or `compact` (SessionStart only).
    #[serde(default)]
    pub source: Option<String>,
    /// `manual` or `auto` (PreCompact only).
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

impl NotificationEvent {
    /// Parse one log line; `None` for anything that does not decode.
    pub fn from_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_start() {
        let line = r#"{"session_id":"s-1","transcript_path":"/p/s-1.jsonl","cwd":"/work",
            "hook_event_name":"SessionStart","source":"resume"}"#;
        let event = NotificationEvent::from_line(line).unwrap();
        assert_eq!(event.hook_event_name, "SessionStart");
        assert_eq!(event.source.as_deref(), Some("resume"));
    }

    #[test]
    fn test_parse_permission_notification() {
        let line = r#"{"session_id":"s-1","hook_event_name":"Notification",
            "message":"Claude needs your permission to use Write"}"#;
        let event = NotificationEvent::from_line(line).unwrap();
        assert_eq!(event.hook_event_name, "Notification");
        assert!(event.message.unwrap().contains("permission"));
    }

    #[test]
    fn test_missing_event_name_is_dropped() {
        assert!(NotificationEvent::from_line(r#"{"session_id":"s-1"}"#).is_none());
        assert!(NotificationEvent::from_line("not json").is_none());
    }
}
