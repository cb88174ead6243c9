use crate::error::{LlmError, Result};
use crate::gateway::ModelGateway;
use crate::types::{AssistantMessage, ChatResponse, Message, ToolCall, ToolDefinition, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat-completions gateway.
#[derive(Clone)]
pub struct OpenAiGateway {
    http: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAiGateway {
    pub fn new(api_key: &str, model: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            url: OPENAI_CHAT_COMPLETIONS_URL.to_string(),
        }
    }

    /// Point at a non-default chat-completions endpoint.
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    #[tracing::instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn invoke(
        &self,
        system_preamble: &str,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        let req = WireChatRequest::new(&self.model, system_preamble, history, tools);

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Http(format!(
                "openai chat status={status} body={body}"
            )));
        }

        let parsed: WireChatResponse = serde_json::from_str(&body)?;
        parsed.try_into()
    }
}

#[derive(Debug, Serialize)]
struct WireChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

impl WireChatRequest {
    fn new(
        model: &str,
        system_preamble: &str,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(WireMessage {
            role: "system".to_string(),
            content: Some(system_preamble.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        });
        messages.extend(history.iter().map(to_wire_message));

        let tools: Vec<WireTool> = tools.iter().map(to_wire_tool).collect();
        let tool_choice = (!tools.is_empty()).then(|| "auto".to_string());

        Self {
            model: model.to_string(),
            messages,
            tools,
            tool_choice,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: String,
    function: WireToolFunction,
}

#[derive(Debug, Serialize)]
struct WireToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

fn to_wire_tool(t: &ToolDefinition) -> WireTool {
    WireTool {
        r#type: "function".to_string(),
        function: WireToolFunction {
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: t.parameters.clone(),
        },
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireToolFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireToolFunctionCall {
    name: String,
    /// JSON-encoded argument object, per the wire format.
    arguments: String,
}

fn to_wire_message(m: &Message) -> WireMessage {
    match m {
        Message::User { text } => WireMessage {
            role: "user".to_string(),
            content: Some(text.clone()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        },
        Message::Assistant(a) => WireMessage {
            role: "assistant".to_string(),
            content: Some(a.text.clone()).filter(|s| !s.is_empty()),
            tool_calls: a
                .tool_calls
                .iter()
                .map(|tc| WireToolCall {
                    id: tc.id.clone(),
                    r#type: "function".to_string(),
                    function: WireToolFunctionCall {
                        name: tc.name.clone(),
                        arguments: tc.arguments.to_string(),
                    },
                })
                .collect(),
            tool_call_id: None,
        },
        Message::ToolResult { tool_call_id, text } => WireMessage {
            role: "tool".to_string(),
            content: Some(text.clone()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.clone()),
        },
        Message::System { text } => WireMessage {
            role: "system".to_string(),
            content: Some(text.clone()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        },
    }
}

#[derive(Debug, Deserialize)]
struct WireChatResponse {
    #[serde(default)]
    id: Option<String>,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireChoiceToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireChoiceToolCall {
    id: String,
    #[serde(default)]
    function: WireChoiceToolCallFunction,
}

#[derive(Debug, Deserialize, Default)]
struct WireChoiceToolCallFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl TryFrom<WireChatResponse> for ChatResponse {
    type Error = LlmError;

    fn try_from(v: WireChatResponse) -> Result<Self> {
        let message_id = v
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let choice = v.choices.into_iter().next().ok_or_else(|| {
            LlmError::ResponseFormat("openai response missing choices".to_string())
        })?;

        let usage = v.usage.unwrap_or(WireUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| {
                let arguments = decode_arguments(&tc.function.arguments)?;
                Ok(ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ChatResponse {
            message: AssistantMessage {
                id: message_id,
                text: choice.message.content.unwrap_or_default(),
                tool_calls,
            },
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            },
        })
    }
}

fn decode_arguments(raw: &str) -> Result<serde_json::Value> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw)
        .map_err(|e| LlmError::ResponseFormat(format!("tool call arguments not valid json: {e}")))
}
