use clap::Parser;
use std::path::PathBuf;

use koewatch_runtime::{default_notification_log, default_projects_root, resolve_api_key, Config};

#[derive(Parser)]
#[command(name = "koewatch")]
#[command(about = "Watch coding-agent transcripts and narrate them aloud", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Transcript root to watch (default: ~/.claude/projects)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Only watch one project directory (first path segment under the root)
    #[arg(long)]
    pub project: Option<String>,

    /// Only tail sessions whose file stem contains this string
    #[arg(long)]
    pub session: Option<String>,

    /// Follow a single transcript file instead of watching the root
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// With --file, replay from the beginning and exit
    #[arg(long)]
    pub from_start: bool,

    /// Show meta events and verbose diagnostics
    #[arg(long)]
    pub debug: bool,

    /// Enable the remote rewriter fallback
    #[arg(long)]
    pub remote: bool,

    /// API key for the remote rewriter (or KOEWATCH_API_KEY / OPENAI_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Chat-completions endpoint for the remote rewriter
    #[arg(long, default_value = "https://api.openai.com")]
    pub remote_endpoint: String,

    /// Narration ruleset overrides (JSON, merged over the built-in rules)
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Speak narrations through a VOICEVOX-compatible engine
    #[arg(long)]
    pub speech: bool,

    /// Speech engine base URL
    #[arg(long, default_value = "http://localhost:50021")]
    pub speech_url: String,

    /// Speech engine speaker id
    #[arg(long, default_value_t = 1)]
    pub speaker: u32,

    /// Hook notification log to follow
    #[arg(long)]
    pub notification_log: Option<PathBuf>,
}

impl Cli {
    pub fn into_config(self) -> Config {
        Config {
            projects_root: self.root.unwrap_or_else(default_projects_root),
            project_filter: self.project,
            session_filter: self.session,
            file: self.file,
            from_start: self.from_start,
            debug: self.debug,
            remote_enabled: self.remote,
            remote_api_key: resolve_api_key(self.api_key),
            remote_endpoint: self.remote_endpoint,
            ruleset_path: self.rules,
            speech_enabled: self.speech,
            speech_url: self.speech_url,
            speaker_id: self.speaker,
            notification_log: self.notification_log.unwrap_or_else(default_notification_log),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_map_into_config() {
        let cli = Cli::parse_from(["koewatch"]);
        let config = cli.into_config();
        assert!(config.file.is_none());
        assert!(!config.debug);
        assert!(!config.speech_enabled);
        assert_eq!(config.speaker_id, 1);
        assert_eq!(config.speech_url, "http://localhost:50021");
    }

    #[test]
    fn test_filters_and_file_mode() {
        let cli = Cli::parse_from([
            "koewatch",
            "--project",
            "alpha",
            "--session",
            "abc",
            "--file",
            "/tmp/s.jsonl",
            "--from-start",
        ]);
        let config = cli.into_config();
        assert_eq!(config.project_filter.as_deref(), Some("alpha"));
        assert_eq!(config.session_filter.as_deref(), Some("abc"));
        assert_eq!(config.file.as_deref(), Some(std::path::Path::new("/tmp/s.jsonl")));
        assert!(config.from_start);
    }
}
