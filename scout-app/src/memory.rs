//! Grounding text for the system preamble, looked up per user.

use scout_store::MemoryStore;

pub const EMPTY_GROUNDING: &str = "(empty)";

/// Facts for the user joined with newlines, `"(empty)"` when there are
/// none. A store failure degrades to empty grounding rather than failing
/// the turn, but is logged so an outage is distinguishable from a user
/// without facts.
pub fn grounding_text(memory: &MemoryStore, user_id: &str) -> String {
    match memory.facts(user_id) {
        Ok(facts) if facts.is_empty() => EMPTY_GROUNDING.to_string(),
        Ok(facts) => facts.join("\n"),
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                "memory lookup failed; proceeding with empty grounding"
            );
            EMPTY_GROUNDING.to_string()
        }
    }
}
