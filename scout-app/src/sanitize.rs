//! History repair: restores the tool-call/tool-result structural invariant
//! before a history is handed to the model.
//!
//! A crash or forced suspension can leave an assistant turn whose tool calls
//! have no recorded results. Feeding such a history to the model is a wire
//! error, so every Brain step runs [`sanitize`] first. The function is pure:
//! same input, same output, no side effects.

use scout_llm::Message;

/// Text of a synthesized result for a tool call that never ran. Worded so
/// the model cannot mistake it for a real result.
pub const INTERRUPTED_TOOL_NOTICE: &str = "System error: the previous tool execution was \
     interrupted before it could run. This is not a real tool result; the call did not \
     execute. Ask the user to retry if the result is still needed.";

/// Repairs every dangling assistant turn by inserting one synthesized
/// failure result per uncovered tool call, in the original call order,
/// directly after the turn's existing results. Original messages are never
/// dropped or reordered; sanitizing a valid history returns it unchanged.
pub fn sanitize(history: &[Message]) -> Vec<Message> {
    let mut out = Vec::with_capacity(history.len());
    let mut idx = 0;

    while idx < history.len() {
        let message = &history[idx];
        out.push(message.clone());
        idx += 1;

        let Some(assistant) = message.as_assistant() else {
            continue;
        };
        if assistant.tool_calls.is_empty() {
            continue;
        }

        // Consume the results that directly follow this turn.
        let mut covered = Vec::new();
        while idx < history.len() {
            let Message::ToolResult { tool_call_id, .. } = &history[idx] else {
                break;
            };
            covered.push(tool_call_id.clone());
            out.push(history[idx].clone());
            idx += 1;
        }

        for call in &assistant.tool_calls {
            if !covered.contains(&call.id) {
                tracing::warn!(
                    tool_call_id = %call.id,
                    tool_name = %call.name,
                    "repairing dangling tool call with a synthesized failure result"
                );
                out.push(Message::tool_result(&call.id, INTERRUPTED_TOOL_NOTICE));
            }
        }
    }

    out
}

/// True when every assistant turn's tool calls are covered by
/// immediately-following results, matched by id.
pub fn is_structurally_valid(history: &[Message]) -> bool {
    let mut idx = 0;
    while idx < history.len() {
        let message = &history[idx];
        idx += 1;

        let Some(assistant) = message.as_assistant() else {
            continue;
        };
        if assistant.tool_calls.is_empty() {
            continue;
        }

        let mut covered = Vec::new();
        while idx < history.len() {
            let Message::ToolResult { tool_call_id, .. } = &history[idx] else {
                break;
            };
            covered.push(tool_call_id.clone());
            idx += 1;
        }
        if !assistant
            .tool_calls
            .iter()
            .all(|call| covered.contains(&call.id))
        {
            return false;
        }
    }
    true
}
