//! Remote rewriter: delegates narration to a chat-completions endpoint.
//! Every transport or API problem turns into a fallback signal so the chain
//! can keep going without it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::rewriter::{Narration, NotificationKind, Rewriter};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(8);

const TOOL_TEMPERATURE: f32 = 0.3;
const TOOL_MAX_TOKENS: u32 = 50;
const TEXT_TEMPERATURE: f32 = 0.8;
const TEXT_MAX_TOKENS: u32 = 150;
const LONG_TEXT_MAX_TOKENS: u32 = 200;
const LONG_TEXT_THRESHOLD: usize = 4096;

const TOOL_PROMPT: &str = "あなたはコーディングエージェントの実況ナレーターです。\
ロボットのような簡潔な口調で、与えられたツール実行を10〜30文字の日本語一文で告知してください。\
ファイルパスやURLをそのまま読み上げてはいけません。";

const THINKING_PROMPT: &str = "あなたはコーディングエージェントの実況ナレーターです。\
ロボットのような簡潔な口調で、エージェントがこれから行うことを未来形で、\
3〜4文以内の日本語に要約してください。ファイルパスやURLは読み上げないでください。";

const RESULT_PROMPT: &str = "あなたはコーディングエージェントの実況ナレーターです。\
ロボットのような簡潔な口調で、エージェントが行ったことを過去形で、\
3〜4文以内の日本語に要約してください。ファイルパスやURLは読み上げないでください。";

pub struct RemoteRewriter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

impl RemoteRewriter {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TRANSPORT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Narration {
        if user.is_empty() {
            return Narration::Fallback;
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.endpoint);
        let response = match self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(error = %err, "remote rewriter request failed");
                return Narration::Fallback;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "remote rewriter returned an error status");
            return Narration::Fallback;
        }

        let body: ChatResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!(error = %err, "remote rewriter response did not decode");
                return Narration::Fallback;
            }
        };

        match body.choices.first() {
            Some(choice) if !choice.message.content.trim().is_empty() => {
                Narration::Utterance(choice.message.content.trim().to_string())
            }
            _ => Narration::Fallback,
        }
    }
}

/// Temperature and output budget for free-text rewriting; long inputs get
/// the larger budget.
fn text_params(input_len: usize) -> (f32, u32) {
    if input_len > LONG_TEXT_THRESHOLD {
        (TEXT_TEMPERATURE, LONG_TEXT_MAX_TOKENS)
    } else {
        (TEXT_TEMPERATURE, TEXT_MAX_TOKENS)
    }
}

#[async_trait]
impl Rewriter for RemoteRewriter {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn narrate_tool_use(&self, tool: &str, input: &Value) -> Narration {
        if tool.is_empty() {
            return Narration::Fallback;
        }
        let user = format!(
            "ツール: {}\n入力: {}",
            tool,
            serde_json::to_string(input).unwrap_or_default()
        );
        self.complete(TOOL_PROMPT, &user, TOOL_TEMPERATURE, TOOL_MAX_TOKENS)
            .await
    }

    async fn narrate_tool_use_permission(&self, _tool: &str) -> Narration {
        // permissions always resolve from the ruleset
        Narration::Fallback
    }

    async fn narrate_text(&self, text: &str, is_thinking: bool) -> Narration {
        let prompt = if is_thinking {
            THINKING_PROMPT
        } else {
            RESULT_PROMPT
        };
        let (temperature, max_tokens) = text_params(text.len());
        self.complete(prompt, text, temperature, max_tokens).await
    }

    async fn narrate_notification(&self, kind: &NotificationKind) -> Narration {
        match kind {
            NotificationKind::Message(message) => {
                self.complete(TOOL_PROMPT, message, TOOL_TEMPERATURE, TOOL_MAX_TOKENS)
                    .await
            }
            _ => Narration::Fallback,
        }
    }

    async fn narrate_task_completion(
        &self,
        _subagent_type: Option<&str>,
        _description: Option<&str>,
    ) -> Narration {
        // the rule narrator covers every task-completion shape
        Narration::Fallback
    }
}
