use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::path::Path;

// SGR color sequences only; hook runners do not emit cursor movement
static ANSI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());

// `<EventType> [<command-path>] <status>`, EventType optionally colon-qualified
static HOOK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+(?::\w+)?)\s+\[([^\]]+)\]\s+(.+)$").unwrap());

/// Remove ANSI color escapes from hook output.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_RE.replace_all(text, "")
}

/// A system record content line recognized as a hook notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookLine {
    /// `Stop`, `SessionStart:resume`, ...
    pub event_type: String,
    /// Path of the hook command that ran.
    pub command: String,
    pub status: String,
}

impl HookLine {
    /// Basename of the hook command path.
    pub fn hook_name(&self) -> String {
        Path::new(&self.command)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.command.clone())
    }
}

/// Parse a system content line as a hook notification after stripping color
/// escapes. Returns `None` when the line does not match the hook shape.
pub fn parse_hook_line(content: &str) -> Option<HookLine> {
    let stripped = strip_ansi(content);
    let caps = HOOK_RE.captures(stripped.trim())?;
    Some(HookLine {
        event_type: caps[1].to_string(),
        command: caps[2].to_string(),
        status: caps[3].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_event_type() {
        let line = parse_hook_line("Stop [/home/user/.claude/hooks/notify.sh] completed").unwrap();
        assert_eq!(line.event_type, "Stop");
        assert_eq!(line.command, "/home/user/.claude/hooks/notify.sh");
        assert_eq!(line.status, "completed");
        assert_eq!(line.hook_name(), "notify.sh");
    }

    #[test]
    fn test_parse_colon_qualified_event_type() {
        let line = parse_hook_line("SessionStart:resume [/opt/hooks/on-start] ok").unwrap();
        assert_eq!(line.event_type, "SessionStart:resume");
        assert_eq!(line.hook_name(), "on-start");
    }

    #[test]
    fn test_ansi_escapes_are_stripped_before_matching() {
        let colored = "\x1b[32mStop\x1b[0m [\x1b[1m/h/n.sh\x1b[0m] done";
        let line = parse_hook_line(colored).unwrap();
        assert_eq!(line.event_type, "Stop");
        assert_eq!(line.command, "/h/n.sh");
        assert_eq!(line.status, "done");
    }

    #[test]
    fn test_stripped_content_rematches_exactly() {
        // Stripping an already-clean line is the identity, so a second match
        // sees bit-identical input
        let clean = "PreCompact [/h/compact.sh] running";
        assert_eq!(strip_ansi(clean), clean);
        assert_eq!(
            parse_hook_line(clean),
            parse_hook_line(&strip_ansi(clean))
        );
    }

    #[test]
    fn test_non_hook_content_declines() {
        assert!(parse_hook_line("plain system message").is_none());
        assert!(parse_hook_line("Stop without brackets").is_none());
        assert!(parse_hook_line("").is_none());
    }
}
