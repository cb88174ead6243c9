use scout_llm::Message;
use serde::{Deserialize, Serialize};

/// A suspended orchestrator step awaiting a human decision. Durable: it
/// survives process restart, and the resume call that resolves it is a
/// wholly separate invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub prompt: String,
    /// Combined cost of the gated calls, kept so the decline path can
    /// report the amount it rejected.
    pub cost: f64,
}

/// What a write does to the thread's pending interrupt.
#[derive(Debug, Clone)]
pub enum InterruptOp {
    Keep,
    Set(Interrupt),
    Clear,
}

/// One durable conversation: the full message log plus at most one pending
/// interrupt, bound to the user who opened the thread.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub thread_id: String,
    pub user_id: String,
    pub messages: Vec<Message>,
    pub interrupt: Option<Interrupt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub user_id: String,
    pub message_count: usize,
    pub pending_interrupt: bool,
    pub updated_at: String,
}
