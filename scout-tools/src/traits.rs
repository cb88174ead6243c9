use crate::error::{Result, ToolError};
use async_trait::async_trait;

/// Cost policy for a priced tool: one invocation costs
/// `unit_cost × arguments[quantity_arg]`, with a missing or non-numeric
/// quantity counting as 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Pricing {
    pub unit_cost: f64,
    pub quantity_arg: String,
}

impl Pricing {
    pub fn per_unit(unit_cost: f64, quantity_arg: impl Into<String>) -> Self {
        Self {
            unit_cost,
            quantity_arg: quantity_arg.into(),
        }
    }

    pub fn cost_of(&self, arguments: &serde_json::Value) -> f64 {
        let quantity = arguments
            .get(&self.quantity_arg)
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);
        self.unit_cost * quantity
    }
}

pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
    /// `Some` marks a priced tool whose execution requires approval.
    pub pricing: Option<Pricing>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn execute(&self, arguments: serde_json::Value) -> Result<String>;
}

pub fn to_llm_tool_def(tool: &dyn Tool) -> scout_llm::ToolDefinition {
    let spec = tool.spec();
    scout_llm::ToolDefinition {
        name: spec.name,
        description: spec.description,
        parameters: spec.parameters_schema,
    }
}

pub(crate) fn require_string(args: &serde_json::Value, key: &str) -> Result<String> {
    let Some(v) = args.get(key) else {
        return Err(ToolError::InvalidArguments(format!("missing key: {key}")));
    };
    match v {
        serde_json::Value::String(s) => Ok(s.clone()),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

pub(crate) fn optional_u64(args: &serde_json::Value, key: &str) -> Result<Option<u64>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n.as_u64().map(Some).ok_or_else(|| {
            ToolError::InvalidArguments(format!("key {key} must be a non-negative integer"))
        }),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be a number, got {other:?}"
        ))),
    }
}
