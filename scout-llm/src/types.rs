use serde::{Deserialize, Serialize};

/// One tool invocation requested by the model.
///
/// `arguments` is the decoded argument object; the wire layer is responsible
/// for encoding it to/from the provider's JSON-string representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A model turn: free text plus zero or more tool invocation requests.
///
/// `id` is stable for the lifetime of the message and is what the decline
/// path uses to locate the turn it replaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantMessage {
    /// Plain-text reply with no tool calls and a fresh id.
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// A single conversation turn.
///
/// Any `Assistant` message with non-empty `tool_calls` must be immediately
/// followed, before the next `Assistant` message, by exactly one
/// `ToolResult` per call, matched by `tool_call_id` and in call order.
/// `System` messages are ephemeral: they are rebuilt every model call and
/// the turn store refuses to persist them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    User { text: String },
    Assistant(AssistantMessage),
    ToolResult { tool_call_id: String, text: String },
    System { text: String },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            text: text.into(),
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(m) => Some(m),
            _ => None,
        }
    }
}

/// A tool the model may call, as declared to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema.
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: AssistantMessage,
    pub usage: Usage,
}
