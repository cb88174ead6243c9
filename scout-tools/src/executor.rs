use crate::error::{Result, ToolError};
use crate::traits::{Pricing, Tool, to_llm_tool_def};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Registry plus invocation seam: every tool call goes through
/// [`ToolExecutor::invoke`] so timeouts and failures are handled uniformly.
/// A failure in one call never prevents execution of sibling calls.
pub struct ToolExecutor {
    tools: Vec<Arc<dyn Tool>>,
    call_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(call_timeout_secs: u64) -> Self {
        Self {
            tools: Vec::new(),
            call_timeout: Duration::from_secs(call_timeout_secs),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    /// Tool declarations for the model gateway.
    pub fn catalog(&self) -> Vec<scout_llm::ToolDefinition> {
        self.tools.iter().map(|t| to_llm_tool_def(t.as_ref())).collect()
    }

    /// Cost policy for `name`, if it is a priced tool.
    pub fn pricing(&self, name: &str) -> Option<Pricing> {
        self.tools
            .iter()
            .find(|t| t.spec().name == name)
            .and_then(|t| t.spec().pricing)
    }

    #[tracing::instrument(level = "info", skip_all, fields(tool = %name))]
    pub async fn invoke(&self, name: &str, arguments: serde_json::Value) -> Result<String> {
        let Some(tool) = self.tools.iter().find(|t| t.spec().name == name) else {
            tracing::warn!(tool = %name, "tool call referenced unknown tool");
            return Err(ToolError::UnknownTool(name.to_string()));
        };

        let started = Instant::now();
        let result = timeout(self.call_timeout, tool.execute(arguments)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(text)) => {
                tracing::info!(latency_ms, output_len = text.len(), "tool call executed");
                Ok(text)
            }
            Ok(Err(e)) => {
                tracing::warn!(latency_ms, error = %e, "tool call failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(latency_ms, "tool call timed out");
                Err(ToolError::Timeout(self.call_timeout.as_secs()))
            }
        }
    }
}
