//! Utterance generation for koewatch.
//!
//! The narrator is a chain of rewriters: the deterministic rule engine first,
//! the remote chat-completion rewriter (when enabled) second, with a TTL
//! cache in front and a speech-oriented text normalizer applied by callers
//! just before synthesis.

mod chain;
mod normalize;
mod remote;
mod rewriter;
mod rules;
mod ruleset;

pub use chain::{NarratorChain, DEFAULT_CACHE_TTL};
pub use normalize::normalize_for_speech;
pub use remote::RemoteRewriter;
pub use rewriter::{Narration, NotificationKind, Rewriter};
pub use rules::{parse_mcp_name, RuleNarrator};
pub use ruleset::{
    CaptureRule, McpRule, Messages, PatternRule, PrefixRule, RuleSet, ToolRule,
    GENERIC_FILE_LABEL, WHOLE_PROJECT_LABEL,
};
