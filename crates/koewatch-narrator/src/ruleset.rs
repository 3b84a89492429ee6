//! Narration ruleset: the JSON document driving the rule-based narrator.
//! A built-in default is embedded; a user-supplied file overrides per key.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_RULES_JSON: &str = include_str!("../assets/default_rules.json");

/// Label used when an extension has no entry in `fileTypeNames`.
pub const GENERIC_FILE_LABEL: &str = "ファイル";

/// Grep's path phrasing when no path is given.
pub const WHOLE_PROJECT_LABEL: &str = "プロジェクト全体";

static EMBEDDED: Lazy<RuleSet> = Lazy::new(|| {
    serde_json::from_str(DEFAULT_RULES_JSON).expect("embedded ruleset is valid JSON")
});

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub messages: Messages,
    #[serde(default)]
    pub rules: HashMap<String, ToolRule>,
    #[serde(default)]
    pub file_type_names: HashMap<String, String>,
    #[serde(default)]
    pub mcp_rules: HashMap<String, McpRule>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Messages {
    pub generic_tool_execution: String,
    pub generic_command_execution: String,
    pub complex_task: String,
    pub current_directory: String,
    pub directory_contents: String,
    pub todo_list_update: String,
    pub generic_tool_permission: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolRule {
    pub default: Option<String>,
    pub prefixes: Vec<PrefixRule>,
    pub extensions: HashMap<String, String>,
    pub patterns: Vec<PatternRule>,
    pub permission_message: Option<String>,
    pub captures: Vec<CaptureRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrefixRule {
    pub prefix: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatternRule {
    pub contains: String,
    pub message: String,
    pub append_to_default: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureRule {
    pub input_key: String,
    pub parse_file_type: bool,
    #[serde(rename = "type")]
    pub value_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpRule {
    pub default: Option<String>,
    pub rules: HashMap<String, ToolRule>,
}

/// Partial document for user overrides; every key is optional and missing
/// keys fall through to the embedded default.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RuleSetOverlay {
    messages: MessagesOverlay,
    rules: HashMap<String, ToolRule>,
    file_type_names: HashMap<String, String>,
    mcp_rules: HashMap<String, McpRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MessagesOverlay {
    generic_tool_execution: Option<String>,
    generic_command_execution: Option<String>,
    complex_task: Option<String>,
    current_directory: Option<String>,
    directory_contents: Option<String>,
    todo_list_update: Option<String>,
    generic_tool_permission: Option<String>,
}

impl RuleSet {
    /// The built-in default ruleset.
    pub fn embedded() -> RuleSet {
        EMBEDDED.clone()
    }

    /// Embedded defaults, optionally overridden per key by a user file.
    pub fn load(user_file: Option<&Path>) -> Result<RuleSet> {
        let mut ruleset = Self::embedded();
        if let Some(path) = user_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read ruleset file: {}", path.display()))?;
            let overlay: RuleSetOverlay = serde_json::from_str(&text)
                .with_context(|| format!("malformed ruleset file: {}", path.display()))?;
            ruleset.apply(overlay);
        }
        Ok(ruleset)
    }

    fn apply(&mut self, overlay: RuleSetOverlay) {
        let m = overlay.messages;
        if let Some(v) = m.generic_tool_execution {
            self.messages.generic_tool_execution = v;
        }
        if let Some(v) = m.generic_command_execution {
            self.messages.generic_command_execution = v;
        }
        if let Some(v) = m.complex_task {
            self.messages.complex_task = v;
        }
        if let Some(v) = m.current_directory {
            self.messages.current_directory = v;
        }
        if let Some(v) = m.directory_contents {
            self.messages.directory_contents = v;
        }
        if let Some(v) = m.todo_list_update {
            self.messages.todo_list_update = v;
        }
        if let Some(v) = m.generic_tool_permission {
            self.messages.generic_tool_permission = v;
        }
        self.rules.extend(overlay.rules);
        self.file_type_names.extend(overlay.file_type_names);
        self.mcp_rules.extend(overlay.mcp_rules);
    }

    pub fn rule(&self, tool: &str) -> Option<&ToolRule> {
        self.rules.get(tool)
    }

    /// Spoken label for a file extension; unknown extensions read as a
    /// generic file.
    pub fn file_type_label(&self, extension: &str) -> &str {
        self.file_type_names
            .get(&extension.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or(GENERIC_FILE_LABEL)
    }
}
