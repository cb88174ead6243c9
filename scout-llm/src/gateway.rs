use crate::error::{LlmError, Result};
use crate::types::{ChatResponse, Message, ToolDefinition};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Black-box model invocation: a system preamble plus the conversation so
/// far, returning one assistant turn.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn invoke(
        &self,
        system_preamble: &str,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse>;
}

/// Test gateway that pops pre-programmed replies in order and records every
/// prompt it receives.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<ChatResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_preamble: String,
    pub history: Vec<Message>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, response: ChatResponse) {
        self.script.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_failure(&self, error: LlmError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Prompts seen so far, in invocation order.
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn invoke(
        &self,
        system_preamble: &str,
        history: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            system_preamble: system_preamble.to_string(),
            history: history.to_vec(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidInput("scripted gateway exhausted".to_string())))
    }
}
