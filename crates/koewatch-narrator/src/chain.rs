//! Narrator chain: tries rewriters in order with a process-wide TTL cache in
//! front. When every rewriter declines, a bounded generic phrase is returned
//! and deliberately not cached.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::rewriter::{Narration, NotificationKind, Rewriter};
use crate::ruleset::Messages;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Upper bound on the fallback phrase built from raw text.
const TEXT_FALLBACK_CHARS: usize = 48;

struct CacheEntry {
    text: String,
    inserted_at: Instant,
}

pub struct NarratorChain {
    rewriters: Vec<Arc<dyn Rewriter>>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    messages: Messages,
}

impl NarratorChain {
    pub fn new(rewriters: Vec<Arc<dyn Rewriter>>, messages: Messages) -> Self {
        Self::with_ttl(rewriters, messages, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(
        rewriters: Vec<Arc<dyn Rewriter>>,
        messages: Messages,
        ttl: Duration,
    ) -> Self {
        Self {
            rewriters,
            cache: RwLock::new(HashMap::new()),
            ttl,
            messages,
        }
    }

    /// Cache key for a tool invocation: the shell tool keys on its command
    /// string, everything else on its sorted input keys.
    pub fn tool_cache_key(tool: &str, input: &Value) -> String {
        if tool == "Bash" {
            let command = input.get("command").and_then(|v| v.as_str()).unwrap_or("");
            return format!("{}:{}", tool, command);
        }
        let mut keys: Vec<&str> = match input.as_object() {
            Some(map) => map.keys().map(String::as_str).collect(),
            None => Vec::new(),
        };
        keys.sort_unstable();
        format!("{}:{}", tool, keys.join(","))
    }

    fn cached(&self, key: &str) -> Option<String> {
        let cache = self.cache.read().ok()?;
        let entry = cache.get(key)?;
        if entry.inserted_at.elapsed() < self.ttl {
            Some(entry.text.clone())
        } else {
            None
        }
    }

    fn store(&self, key: String, text: &str) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(
                key,
                CacheEntry {
                    text: text.to_string(),
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    pub async fn narrate_tool_use(&self, tool: &str, input: &Value) -> String {
        let key = Self::tool_cache_key(tool, input);
        if let Some(hit) = self.cached(&key) {
            return hit;
        }

        for rewriter in &self.rewriters {
            if let Narration::Utterance(text) = rewriter.narrate_tool_use(tool, input).await {
                self.store(key, &text);
                return text;
            }
        }

        self.messages.generic_tool_execution.replace("{tool}", tool)
    }

    pub async fn narrate_tool_use_permission(&self, tool: &str) -> String {
        let key = format!("permission:{}", tool);
        if let Some(hit) = self.cached(&key) {
            return hit;
        }

        for rewriter in &self.rewriters {
            if let Narration::Utterance(text) = rewriter.narrate_tool_use_permission(tool).await {
                self.store(key, &text);
                return text;
            }
        }

        self.messages.generic_tool_permission.replace("{tool}", tool)
    }

    /// Free text is never cached; each thinking/text block is unique.
    pub async fn narrate_text(&self, text: &str, is_thinking: bool) -> String {
        for rewriter in &self.rewriters {
            if let Narration::Utterance(out) = rewriter.narrate_text(text, is_thinking).await {
                return out;
            }
        }
        bounded_phrase(text)
    }

    pub async fn narrate_notification(&self, kind: &NotificationKind) -> String {
        for rewriter in &self.rewriters {
            if let Narration::Utterance(out) = rewriter.narrate_notification(kind).await {
                return out;
            }
        }
        match kind {
            NotificationKind::Message(message) => bounded_phrase(message),
            _ => "通知があります".to_string(),
        }
    }

    pub async fn narrate_task_completion(
        &self,
        subagent_type: Option<&str>,
        description: Option<&str>,
    ) -> String {
        for rewriter in &self.rewriters {
            if let Narration::Utterance(out) = rewriter
                .narrate_task_completion(subagent_type, description)
                .await
            {
                return out;
            }
        }
        "タスクが完了しました".to_string()
    }
}

/// First line of `text`, bounded for speech.
fn bounded_phrase(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let mut out: String = first_line.chars().take(TEXT_FALLBACK_CHARS).collect();
    if first_line.chars().count() > TEXT_FALLBACK_CHARS {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleNarrator;
    use crate::ruleset::RuleSet;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls so cache behavior is observable.
    struct CountingRewriter {
        calls: AtomicUsize,
        answer: Option<String>,
    }

    impl CountingRewriter {
        fn new(answer: Option<&str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                answer: answer.map(|s| s.to_string()),
            }
        }

        fn narration(&self) -> Narration {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.answer {
                Some(text) => Narration::Utterance(text.clone()),
                None => Narration::Fallback,
            }
        }
    }

    #[async_trait]
    impl Rewriter for CountingRewriter {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn narrate_tool_use(&self, _tool: &str, _input: &Value) -> Narration {
            self.narration()
        }

        async fn narrate_tool_use_permission(&self, _tool: &str) -> Narration {
            self.narration()
        }

        async fn narrate_text(&self, _text: &str, _is_thinking: bool) -> Narration {
            self.narration()
        }

        async fn narrate_notification(&self, _kind: &NotificationKind) -> Narration {
            self.narration()
        }

        async fn narrate_task_completion(
            &self,
            _subagent_type: Option<&str>,
            _description: Option<&str>,
        ) -> Narration {
            self.narration()
        }
    }

    fn messages() -> Messages {
        RuleSet::embedded().messages
    }

    #[test]
    fn test_tool_cache_key_shapes() {
        assert_eq!(
            NarratorChain::tool_cache_key("Bash", &json!({"command": "git status"})),
            "Bash:git status"
        );
        assert_eq!(
            NarratorChain::tool_cache_key("Read", &json!({"limit": 5, "file_path": "/a"})),
            "Read:file_path,limit"
        );
        assert_eq!(NarratorChain::tool_cache_key("X", &json!(null)), "X:");
    }

    #[tokio::test]
    async fn test_cache_hit_is_byte_identical_and_skips_rewriters() {
        let counting = Arc::new(CountingRewriter::new(Some("発話")));
        let chain = NarratorChain::new(vec![counting.clone()], messages());

        let input = json!({"command": "git status"});
        let first = chain.narrate_tool_use("Bash", &input).await;
        let second = chain.narrate_tool_use("Bash", &input).await;

        assert_eq!(first, "発話");
        assert_eq!(first, second);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed() {
        let counting = Arc::new(CountingRewriter::new(Some("発話")));
        let chain =
            NarratorChain::with_ttl(vec![counting.clone()], messages(), Duration::from_millis(10));

        let input = json!({"command": "ls"});
        chain.narrate_tool_use("Bash", &input).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        chain.narrate_tool_use("Bash", &input).await;

        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_first_non_fallback_rewriter_wins() {
        let declining = Arc::new(CountingRewriter::new(None));
        let answering = Arc::new(CountingRewriter::new(Some("二番目")));
        let chain =
            NarratorChain::new(vec![declining.clone(), answering.clone()], messages());

        let text = chain.narrate_tool_use("Tool", &json!({})).await;
        assert_eq!(text, "二番目");
        assert_eq!(declining.calls.load(Ordering::SeqCst), 1);
        assert_eq!(answering.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_fallback_yields_generic_phrase_uncached() {
        let declining = Arc::new(CountingRewriter::new(None));
        let chain = NarratorChain::new(vec![declining.clone()], messages());

        let first = chain.narrate_tool_use("Mystery", &json!({})).await;
        assert_eq!(first, "ツール「Mystery」を実行します");

        // the generic phrase was not cached, so the rewriter is asked again
        chain.narrate_tool_use("Mystery", &json!({})).await;
        assert_eq!(declining.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_inputs_never_panic() {
        let rules: Arc<dyn Rewriter> = Arc::new(RuleNarrator::new(RuleSet::embedded()));
        let chain = NarratorChain::new(vec![rules], messages());

        assert_eq!(chain.narrate_tool_use("", &json!({})).await, "ツール「」を実行します");
        assert_eq!(
            chain.narrate_tool_use_permission("").await,
            "「」の使用許可を求めています"
        );
        assert_eq!(chain.narrate_text("", false).await, "");
    }

    #[tokio::test]
    async fn test_text_fallback_is_bounded() {
        let chain = NarratorChain::new(vec![], messages());
        let long = "x".repeat(200);
        let out = chain.narrate_text(&long, true).await;
        assert_eq!(out.chars().count(), TEXT_FALLBACK_CHARS + 1);
        assert!(out.ends_with('…'));
    }
}
