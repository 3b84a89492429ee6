use async_trait::async_trait;
use serde::Serialize;

/// One rendered feed block, shaped for remote clients.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub text: String,
    pub timestamp: String,
    pub metadata: BroadcastMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMetadata {
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

impl BroadcastMessage {
    pub fn new(text: String, event_type: &str, tool_name: Option<String>, session_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_type: "text",
            text,
            timestamp: chrono::Utc::now().to_rfc3339(),
            metadata: BroadcastMetadata {
                event_type: event_type.to_string(),
                tool_name,
                session_id: session_id.to_string(),
            },
        }
    }
}

/// Remote client surface. Pluggable and usually absent; the stdout feed does
/// not depend on it.
#[async_trait]
pub trait Broadcast: Send + Sync {
    async fn send(&self, message: BroadcastMessage);
}
