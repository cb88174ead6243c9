//! Message data model and BYO-key model gateway for Scout.
//!
//! Pure HTTP client; the orchestrator talks to it through the
//! [`ModelGateway`] trait so tests can script replies.

mod error;
mod gateway;
mod openai;
mod types;

pub use error::{LlmError, Result};
pub use gateway::{ModelGateway, RecordedCall, ScriptedGateway};
pub use openai::OpenAiGateway;
pub use types::{AssistantMessage, ChatResponse, Message, ToolCall, ToolDefinition, Usage};
