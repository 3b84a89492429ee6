//! Rule-based narrator: deterministic templates driven by the loaded ruleset.
//! Paths the rules cannot cover signal fallback so the chain may consult the
//! next rewriter; nothing in here panics on odd input.

use async_trait::async_trait;
use serde_json::Value;

use crate::normalize::url_host;
use crate::rewriter::{Narration, NotificationKind, Rewriter};
use crate::ruleset::{CaptureRule, RuleSet, ToolRule, WHOLE_PROJECT_LABEL};

pub struct RuleNarrator {
    rules: RuleSet,
}

impl RuleNarrator {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn ruleset(&self) -> &RuleSet {
        &self.rules
    }

    fn tool_use(&self, tool: &str, input: &Value) -> Narration {
        if tool.is_empty() {
            return Narration::Fallback;
        }

        if let Some((server, operation)) = parse_mcp_name(tool) {
            return self.mcp_tool_use(&server, &operation, input);
        }

        match tool {
            "Bash" => self.bash(input),
            "Read" | "Write" | "Edit" => self.file_tool(tool, input),
            "MultiEdit" => self.multi_edit(input),
            "Grep" => self.grep(input),
            "Glob" => self.glob(input),
            "LS" => self.list_directory(input),
            "WebFetch" => self.web_fetch(input),
            "Task" => self.task(input),
            "TodoWrite" => self.todo_write(input),
            other => self.generic_tool(other, input),
        }
    }

    fn mcp_tool_use(&self, server: &str, operation: &str, input: &Value) -> Narration {
        let Some(server_rules) = self.rules.mcp_rules.get(server) else {
            return Narration::Fallback;
        };

        if let Some(rule) = server_rules.rules.get(operation) {
            if let Some(text) = apply_rule(rule, input, &self.rules) {
                return Narration::Utterance(text);
            }
        }

        match &server_rules.default {
            Some(template) => Narration::Utterance(template.replace("{operation}", operation)),
            None => Narration::Fallback,
        }
    }

    fn bash(&self, input: &Value) -> Narration {
        let Some(command) = non_empty_str(input, "command") else {
            return Narration::Fallback;
        };

        if let Some(rule) = self.rules.rule("Bash") {
            for prefix in &rule.prefixes {
                if command.starts_with(prefix.prefix.as_str()) {
                    return Narration::Utterance(prefix.message.clone());
                }
            }
        }

        let first_word = command.split_whitespace().next().unwrap_or(command);
        Narration::Utterance(
            self.rules
                .messages
                .generic_command_execution
                .replace("{command}", first_word),
        )
    }

    fn file_tool(&self, tool: &str, input: &Value) -> Narration {
        let Some(path) = non_empty_str(input, "file_path") else {
            return Narration::Fallback;
        };
        let Some(template) = self.rules.rule(tool).and_then(|r| r.default.as_deref()) else {
            return Narration::Fallback;
        };

        let filename = base_name(path);
        let label = self.rules.file_type_label(extension_of(path));
        Narration::Utterance(
            template
                .replace("{filetype}", label)
                .replace("{filename}", &filename),
        )
    }

    fn multi_edit(&self, input: &Value) -> Narration {
        let Some(path) = non_empty_str(input, "file_path") else {
            return Narration::Fallback;
        };
        let Some(template) = self
            .rules
            .rule("MultiEdit")
            .and_then(|r| r.default.as_deref())
        else {
            return Narration::Fallback;
        };

        let count = input
            .get("edits")
            .and_then(|e| e.as_array())
            .map(|a| a.len())
            .unwrap_or(0);
        Narration::Utterance(
            template
                .replace("{filename}", &base_name(path))
                .replace("{count}", &count.to_string()),
        )
    }

    fn grep(&self, input: &Value) -> Narration {
        let Some(pattern) = non_empty_str(input, "pattern") else {
            return Narration::Fallback;
        };
        let Some(template) = self.rules.rule("Grep").and_then(|r| r.default.as_deref()) else {
            return Narration::Fallback;
        };

        let path = non_empty_str(input, "path").unwrap_or(WHOLE_PROJECT_LABEL);
        Narration::Utterance(
            template
                .replace("{pattern}", pattern)
                .replace("{path}", path),
        )
    }

    fn glob(&self, input: &Value) -> Narration {
        let Some(pattern) = non_empty_str(input, "pattern") else {
            return Narration::Fallback;
        };
        let rule = self.rules.rule("Glob");

        if let Some(rule) = rule {
            if let Some(message) = match_patterns(rule, pattern) {
                return Narration::Utterance(message);
            }
        }

        match rule.and_then(|r| r.default.as_deref()) {
            Some(template) => Narration::Utterance(template.replace("{pattern}", pattern)),
            None => Narration::Fallback,
        }
    }

    fn list_directory(&self, input: &Value) -> Narration {
        let path = non_empty_str(input, "path").unwrap_or(".");
        if path == "." || path == "/" {
            return Narration::Utterance(self.rules.messages.current_directory.clone());
        }
        Narration::Utterance(
            self.rules
                .messages
                .directory_contents
                .replace("{dirname}", &base_name(path)),
        )
    }

    fn web_fetch(&self, input: &Value) -> Narration {
        let Some(url) = non_empty_str(input, "url") else {
            return Narration::Fallback;
        };
        let rule = self.rules.rule("WebFetch");

        if let Some(rule) = rule {
            if let Some(message) = match_patterns(rule, url) {
                return Narration::Utterance(message);
            }
        }

        match rule.and_then(|r| r.default.as_deref()) {
            Some(template) => {
                let domain = url_host(url).unwrap_or_else(|| url.to_string());
                Narration::Utterance(template.replace("{domain}", &domain))
            }
            None => Narration::Fallback,
        }
    }

    fn task(&self, input: &Value) -> Narration {
        let description = non_empty_str(input, "description");
        let subagent = non_empty_str(input, "subagent_type");

        match (subagent, description) {
            (Some(agent), Some(desc)) => {
                if let Some(template) = self.rules.rule("Task").and_then(|r| r.default.as_deref()) {
                    return Narration::Utterance(
                        template
                            .replace("{subagent_type}", agent)
                            .replace("{description}", desc),
                    );
                }
                Narration::Utterance(format!("{} agentがタスク「{}」を実行します", agent, desc))
            }
            (None, Some(desc)) => Narration::Utterance(format!("タスク「{}」を実行します", desc)),
            _ => Narration::Utterance(self.rules.messages.complex_task.clone()),
        }
    }

    fn todo_write(&self, input: &Value) -> Narration {
        let Some(todos) = input.get("todos").and_then(|t| t.as_array()) else {
            return Narration::Fallback;
        };

        let count_status = |status: &str| {
            todos
                .iter()
                .filter(|item| item.get("status").and_then(|s| s.as_str()) == Some(status))
                .count()
        };

        Narration::Utterance(
            self.rules
                .messages
                .todo_list_update
                .replace("{completed}", &count_status("completed").to_string())
                .replace("{in_progress}", &count_status("in_progress").to_string())
                .replace("{pending}", &count_status("pending").to_string()),
        )
    }

    /// Tools with a configured rule narrate from captures or the rule's
    /// default; tools the ruleset does not know signal fallback.
    fn generic_tool(&self, tool: &str, input: &Value) -> Narration {
        let Some(rule) = self.rules.rule(tool) else {
            return Narration::Fallback;
        };

        match apply_rule(rule, input, &self.rules) {
            Some(text) => Narration::Utterance(text),
            None => Narration::Utterance(
                self.rules
                    .messages
                    .generic_tool_execution
                    .replace("{tool}", tool),
            ),
        }
    }

    fn permission(&self, tool: &str) -> Narration {
        if tool.is_empty() {
            return Narration::Fallback;
        }

        if let Some((server, operation)) = parse_mcp_name(tool) {
            if let Some(message) = self
                .rules
                .mcp_rules
                .get(&server)
                .and_then(|s| s.rules.get(&operation))
                .and_then(|r| r.permission_message.clone())
            {
                return Narration::Utterance(message);
            }
        } else if let Some(message) = self
            .rules
            .rule(tool)
            .and_then(|r| r.permission_message.clone())
        {
            return Narration::Utterance(message);
        }

        Narration::Utterance(
            self.rules
                .messages
                .generic_tool_permission
                .replace("{tool}", tool),
        )
    }

    fn notification(&self, kind: &NotificationKind) -> Narration {
        let text = match kind {
            NotificationKind::SessionStart { source } => match source.as_deref() {
                Some("startup") => "セッションを開始しました",
                Some("clear") => "新しいセッションを開始しました",
                Some("resume") => "セッションを再開しました",
                Some("compact") => "コンパクト後にセッションを再開しました",
                _ => return Narration::Fallback,
            },
            NotificationKind::PreCompact { trigger } => match trigger.as_deref() {
                Some("manual") => "コンテキストを手動で整理します",
                Some("auto") => "コンテキストを自動で整理します",
                _ => return Narration::Fallback,
            },
            NotificationKind::Stop => "応答が完了しました",
            NotificationKind::Message(_) => return Narration::Fallback,
        };
        Narration::Utterance(text.to_string())
    }

    fn task_completion(
        &self,
        subagent_type: Option<&str>,
        description: Option<&str>,
    ) -> Narration {
        let text = match (subagent_type, description) {
            (Some(agent), Some(desc)) => {
                format!("{} agentがタスク「{}」を完了しました", agent, desc)
            }
            (None, Some(desc)) => format!("タスク「{}」を完了しました", desc),
            _ => "タスクを完了しました".to_string(),
        };
        Narration::Utterance(text)
    }
}

#[async_trait]
impl Rewriter for RuleNarrator {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn narrate_tool_use(&self, tool: &str, input: &Value) -> Narration {
        self.tool_use(tool, input)
    }

    async fn narrate_tool_use_permission(&self, tool: &str) -> Narration {
        self.permission(tool)
    }

    async fn narrate_text(&self, _text: &str, _is_thinking: bool) -> Narration {
        // free text is the remote rewriter's concern
        Narration::Fallback
    }

    async fn narrate_notification(&self, kind: &NotificationKind) -> Narration {
        self.notification(kind)
    }

    async fn narrate_task_completion(
        &self,
        subagent_type: Option<&str>,
        description: Option<&str>,
    ) -> Narration {
        self.task_completion(subagent_type, description)
    }
}

/// `mcp__server__operation`, plus the legacy single-underscore form.
pub fn parse_mcp_name(tool: &str) -> Option<(String, String)> {
    if let Some(rest) = tool.strip_prefix("mcp__") {
        let (server, operation) = rest.split_once("__")?;
        if server.is_empty() || operation.is_empty() {
            return None;
        }
        return Some((server.to_string(), operation.to_string()));
    }
    if let Some(rest) = tool.strip_prefix("mcp_") {
        let (server, operation) = rest.split_once('_')?;
        if server.is_empty() || operation.is_empty() {
            return None;
        }
        return Some((server.to_string(), operation.to_string()));
    }
    None
}

/// Captures into the default template, else a pattern match against any
/// string value of the input, else the default verbatim.
fn apply_rule(rule: &ToolRule, input: &Value, rules: &RuleSet) -> Option<String> {
    if let Some(template) = rule.default.as_deref() {
        if !rule.captures.is_empty() {
            return Some(apply_captures(template, &rule.captures, input, rules));
        }
    }

    if !rule.patterns.is_empty() {
        let haystacks = string_values(input);
        for pattern in &rule.patterns {
            if haystacks.iter().any(|s| s.contains(&pattern.contains)) {
                if pattern.append_to_default {
                    if let Some(default) = rule.default.as_deref() {
                        return Some(format!("{}{}", default, pattern.message));
                    }
                }
                return Some(pattern.message.clone());
            }
        }
    }

    rule.default.clone()
}

fn apply_captures(
    template: &str,
    captures: &[CaptureRule],
    input: &Value,
    rules: &RuleSet,
) -> String {
    let mut text = template.to_string();
    for capture in captures {
        let value = input.get(&capture.input_key).unwrap_or(&Value::Null);
        let rendered = stringify_value(value);
        text = text.replace(&format!("{{{}}}", capture.input_key), &rendered);
        if capture.parse_file_type {
            let label = rules.file_type_label(extension_of(&rendered));
            text = text.replace("{filetype}", label);
        }
    }
    text
}

/// Numbers print without decimals, arrays comma-join their items.
fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else {
                n.as_f64()
                    .map(|f| format!("{}", f.trunc() as i64))
                    .unwrap_or_default()
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify_value)
            .collect::<Vec<_>>()
            .join(","),
        _ => String::new(),
    }
}

fn string_values(input: &Value) -> Vec<String> {
    match input {
        Value::Object(map) => map
            .values()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// First pattern whose needle is contained in `haystack`.
fn match_patterns(rule: &ToolRule, haystack: &str) -> Option<String> {
    rule.patterns
        .iter()
        .find(|p| haystack.contains(&p.contains))
        .map(|p| {
            if p.append_to_default {
                if let Some(default) = rule.default.as_deref() {
                    return format!("{}{}", default, p.message);
                }
            }
            p.message.clone()
        })
}

fn non_empty_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn base_name(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn extension_of(path: &str) -> &str {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::RuleSet;
    use serde_json::json;

    fn narrator() -> RuleNarrator {
        RuleNarrator::new(RuleSet::embedded())
    }

    fn utterance(n: Narration) -> String {
        match n {
            Narration::Utterance(text) => text,
            Narration::Fallback => panic!("Expected an utterance, got fallback"),
        }
    }

    #[test]
    fn test_bash_prefix_match() {
        let n = narrator().tool_use("Bash", &json!({"command": "git commit -m x"}));
        assert_eq!(utterance(n), "変更をGitにコミットします");
    }

    #[test]
    fn test_bash_unmatched_command_uses_first_word() {
        let n = narrator().tool_use("Bash", &json!({"command": "zzz --flag"}));
        assert_eq!(utterance(n), "コマンド「zzz」を実行します");
    }

    #[test]
    fn test_bash_without_command_falls_back() {
        assert!(narrator().tool_use("Bash", &json!({})).is_fallback());
        assert!(narrator().tool_use("Bash", &json!({"command": ""})).is_fallback());
    }

    #[test]
    fn test_read_resolves_file_type() {
        let n = narrator().tool_use("Read", &json!({"file_path": "/src/main.rs"}));
        assert_eq!(utterance(n), "Rustファイル「main.rs」を読み込みます");
    }

    #[test]
    fn test_unknown_extension_reads_as_generic_file() {
        let n = narrator().tool_use("Read", &json!({"file_path": "/x/data.zzz"}));
        assert_eq!(utterance(n), "ファイル「data.zzz」を読み込みます");
    }

    #[test]
    fn test_multi_edit_counts_edits() {
        let input = json!({"file_path": "/a/lib.rs", "edits": [{}, {}, {}]});
        let n = narrator().tool_use("MultiEdit", &input);
        assert_eq!(utterance(n), "「lib.rs」に3箇所の編集を行います");
    }

    #[test]
    fn test_grep_defaults_to_whole_project() {
        let n = narrator().tool_use("Grep", &json!({"pattern": "fn main"}));
        assert_eq!(utterance(n), "「fn main」をプロジェクト全体で検索します");
    }

    #[test]
    fn test_ls_current_directory_phrasing() {
        let n = narrator().tool_use("LS", &json!({"path": "."}));
        assert_eq!(utterance(n), "現在のディレクトリを確認します");

        let n = narrator().tool_use("LS", &json!({"path": "/work/src"}));
        assert_eq!(utterance(n), "「src」の内容を確認します");
    }

    #[test]
    fn test_web_fetch_pattern_and_domain_fallback() {
        let n = narrator().tool_use("WebFetch", &json!({"url": "https://github.com/a/b"}));
        assert_eq!(utterance(n), "ギットハブのページを取得します");

        let n = narrator().tool_use("WebFetch", &json!({"url": "https://example.org/doc"}));
        assert_eq!(utterance(n), "example.orgから情報を取得します");
    }

    #[test]
    fn test_task_three_phrasings() {
        let both = narrator().tool_use(
            "Task",
            &json!({"description": "refactor", "subagent_type": "code-fixer"}),
        );
        assert_eq!(utterance(both), "code-fixer agentがタスク「refactor」を実行します");

        let desc_only = narrator().tool_use("Task", &json!({"description": "refactor"}));
        assert_eq!(utterance(desc_only), "タスク「refactor」を実行します");

        let neither = narrator().tool_use("Task", &json!({}));
        assert_eq!(utterance(neither), "複雑なタスクを実行します");
    }

    #[test]
    fn test_todo_write_counts_by_status() {
        let input = json!({"todos": [
            {"status": "completed"}, {"status": "completed"},
            {"status": "in_progress"}, {"status": "pending"}
        ]});
        let n = narrator().tool_use("TodoWrite", &input);
        assert_eq!(
            utterance(n),
            "タスクリストを更新します。完了2件、進行中1件、未着手1件"
        );
    }

    #[test]
    fn test_mcp_operation_rule() {
        let n = narrator().tool_use("mcp__filesystem__write", &json!({"path": "/a"}));
        assert_eq!(utterance(n), "ファイルシステムへ書き込みます");
    }

    #[test]
    fn test_mcp_server_default_substitutes_operation() {
        let n = narrator().tool_use("mcp__filesystem__chmod", &json!({}));
        assert_eq!(utterance(n), "ファイルシステムでchmodを実行します");
    }

    #[test]
    fn test_mcp_unknown_server_falls_back() {
        assert!(narrator()
            .tool_use("mcp__unknown__op", &json!({}))
            .is_fallback());
    }

    #[test]
    fn test_legacy_mcp_name_form() {
        assert_eq!(
            parse_mcp_name("mcp_filesystem_write_file"),
            Some(("filesystem".to_string(), "write_file".to_string()))
        );
        assert_eq!(
            parse_mcp_name("mcp__github__create_issue"),
            Some(("github".to_string(), "create_issue".to_string()))
        );
        assert_eq!(parse_mcp_name("Bash"), None);
    }

    #[test]
    fn test_unknown_tool_falls_back() {
        assert!(narrator().tool_use("Mystery", &json!({})).is_fallback());
    }

    #[test]
    fn test_capture_substitution_with_array_and_number() {
        let mut rules = RuleSet::embedded();
        rules.rules.insert(
            "Custom".to_string(),
            crate::ruleset::ToolRule {
                default: Some("{items}を{count}件処理します".to_string()),
                captures: vec![
                    CaptureRule {
                        input_key: "items".to_string(),
                        ..Default::default()
                    },
                    CaptureRule {
                        input_key: "count".to_string(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
        );
        let narrator = RuleNarrator::new(rules);
        let n = narrator.tool_use("Custom", &json!({"items": ["a", "b"], "count": 2.0}));
        assert_eq!(utterance(n), "a,bを2件処理します");
    }

    #[test]
    fn test_permission_messages() {
        assert_eq!(
            utterance(narrator().permission("Write")),
            "ファイル書き込みの許可を求めています"
        );
        assert_eq!(
            utterance(narrator().permission("mcp__filesystem__write")),
            "ファイルシステムへの書き込み許可を求めています"
        );
        assert_eq!(
            utterance(narrator().permission("Mystery")),
            "「Mystery」の使用許可を求めています"
        );
        assert!(narrator().permission("").is_fallback());
    }

    #[test]
    fn test_notification_fixed_texts() {
        let n = narrator().notification(&NotificationKind::SessionStart {
            source: Some("resume".to_string()),
        });
        assert_eq!(utterance(n), "セッションを再開しました");

        let n = narrator().notification(&NotificationKind::PreCompact {
            trigger: Some("auto".to_string()),
        });
        assert_eq!(utterance(n), "コンテキストを自動で整理します");

        assert_eq!(utterance(narrator().notification(&NotificationKind::Stop)), "応答が完了しました");

        // unknown subtypes and free text decline
        assert!(narrator()
            .notification(&NotificationKind::SessionStart { source: None })
            .is_fallback());
        assert!(narrator()
            .notification(&NotificationKind::Message("hi".to_string()))
            .is_fallback());
    }

    #[test]
    fn test_task_completion_three_phrasings() {
        assert_eq!(
            utterance(narrator().task_completion(Some("code-fixer"), Some("refactor"))),
            "code-fixer agentがタスク「refactor」を完了しました"
        );
        assert_eq!(
            utterance(narrator().task_completion(None, Some("refactor"))),
            "タスク「refactor」を完了しました"
        );
        assert_eq!(
            utterance(narrator().task_completion(None, None)),
            "タスクを完了しました"
        );
    }
}
