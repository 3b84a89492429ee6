use std::path::PathBuf;

/// Process-wide options, read once at startup from flags and environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the project-keyed transcript tree.
    pub projects_root: PathBuf,
    /// Restrict watching to one first-level project directory.
    pub project_filter: Option<String>,
    /// Restrict tailer creation to session stems containing this string.
    pub session_filter: Option<String>,
    /// Follow one transcript file directly instead of watching the root.
    pub file: Option<PathBuf>,
    /// Read the direct file from byte 0 instead of seeking to its end.
    pub from_start: bool,
    pub debug: bool,
    pub remote_enabled: bool,
    pub remote_api_key: Option<String>,
    pub remote_endpoint: String,
    pub ruleset_path: Option<PathBuf>,
    pub speech_enabled: bool,
    pub speech_url: String,
    pub speaker_id: u32,
    pub notification_log: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            projects_root: default_projects_root(),
            project_filter: None,
            session_filter: None,
            file: None,
            from_start: false,
            debug: false,
            remote_enabled: false,
            remote_api_key: None,
            remote_endpoint: "https://api.openai.com".to_string(),
            ruleset_path: None,
            speech_enabled: false,
            speech_url: "http://localhost:50021".to_string(),
            speaker_id: 1,
            notification_log: default_notification_log(),
        }
    }
}

/// `~/.claude/projects`, falling back to a relative path when the home
/// directory cannot be determined.
pub fn default_projects_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".claude").join("projects"))
        .unwrap_or_else(|| PathBuf::from(".claude/projects"))
}

pub fn default_notification_log() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".claude").join("koewatch").join("notifications.jsonl"))
        .unwrap_or_else(|| PathBuf::from(".claude/koewatch/notifications.jsonl"))
}

/// API key resolution: explicit flag first, then environment.
pub fn resolve_api_key(explicit: Option<String>) -> Option<String> {
    explicit
        .or_else(|| std::env::var("KOEWATCH_API_KEY").ok())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .filter(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_projects_root_is_under_claude() {
        let root = default_projects_root();
        assert!(root.ends_with(PathBuf::from(".claude/projects")));
    }

    #[test]
    fn test_explicit_api_key_wins() {
        assert_eq!(
            resolve_api_key(Some("flag-key".to_string())),
            Some("flag-key".to_string())
        );
    }
}
