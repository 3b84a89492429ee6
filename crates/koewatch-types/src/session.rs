use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identity of one transcript, derived from its path: the parent directory
/// name is the project, the file stem is the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub project: String,
    pub session: String,
}

impl SessionIdentity {
    pub fn new(project: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            session: session.into(),
        }
    }

    /// Derive identity from a transcript path like
    /// `~/.claude/projects/<project>/<session>.jsonl`.
    pub fn from_transcript_path(path: &Path) -> Option<Self> {
        let session = path.file_stem()?.to_str()?.to_string();
        let project = path.parent()?.file_name()?.to_str()?.to_string();
        Some(Self { project, session })
    }

    /// Fallback identity for inputs without a usable path (stdin, tests).
    pub fn unknown() -> Self {
        Self {
            project: "unknown".to_string(),
            session: "unknown".to_string(),
        }
    }
}

impl std::fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project, self.session)
    }
}
