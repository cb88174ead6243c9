//! The conversation state machine: Brain (model call) → Gate (charge
//! approval) → Execute (tool calls) → Brain, with End terminal for the
//! turn.
//!
//! The orchestrator holds no conversation state of its own; every external
//! invocation loads the session from the turn store, advances it, and
//! persists each step atomically. Suspension is a return value
//! ([`TurnOutcome::Paused`]) backed by a durable interrupt row, never a
//! blocked execution context: the process can exit between suspension and
//! resume without losing anything.

use crate::memory;
use crate::sanitize::sanitize;
use scout_llm::{AssistantMessage, LlmError, Message, ModelGateway, ToolCall};
use scout_store::{Interrupt, InterruptOp, MemoryStore, SessionRecord, StoreError, TurnStore};
use scout_tools::ToolExecutor;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("model gateway failed: {0}")]
    Gateway(#[from] LlmError),

    #[error("turn store failed: {0}")]
    Store(#[from] StoreError),

    #[error("unknown thread: {0}")]
    UnknownThread(String),

    #[error("thread {0} has no pending approval")]
    NoPendingInterrupt(String),

    #[error("thread {0} is awaiting a charge approval; resolve it before sending new messages")]
    InterruptPending(String),
}

/// Result of one external invocation: the turn either ran to completion or
/// suspended awaiting a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed { text: String },
    Paused { prompt: String },
}

enum Node {
    Brain,
    Gate,
    Execute,
}

enum GateVerdict {
    End { text: String },
    Execute,
    Paused { prompt: String },
}

pub struct Orchestrator {
    store: Arc<TurnStore>,
    memory: Arc<MemoryStore>,
    gateway: Arc<dyn ModelGateway>,
    tools: Arc<ToolExecutor>,
    /// System preamble template; `{user_details}` is replaced with the
    /// user's grounding text every Brain step.
    system_prompt: String,
    max_tool_loops: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<TurnStore>,
        memory: Arc<MemoryStore>,
        gateway: Arc<dyn ModelGateway>,
        tools: Arc<ToolExecutor>,
        system_prompt: String,
        max_tool_loops: usize,
    ) -> Self {
        Self {
            store,
            memory,
            gateway,
            tools,
            system_prompt,
            max_tool_loops: max_tool_loops.max(1),
        }
    }

    /// Inject a user message and run the machine to completion or
    /// suspension.
    #[tracing::instrument(level = "info", skip_all, fields(thread_id = %thread_id, user_id = %user_id))]
    pub async fn start_turn(
        &self,
        thread_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let _turn = self.store.lock_thread(thread_id).await;

        let mut session = match self.store.load(thread_id)? {
            Some(session) => session,
            None => {
                self.store.create(thread_id, user_id)?;
                SessionRecord {
                    thread_id: thread_id.to_string(),
                    user_id: user_id.to_string(),
                    messages: Vec::new(),
                    interrupt: None,
                }
            }
        };
        if session.interrupt.is_some() {
            return Err(TurnError::InterruptPending(thread_id.to_string()));
        }

        // Repair anything a previous crash left dangling, then inject the
        // user turn; both land in the same transaction.
        let repaired = sanitize(&session.messages);
        let repairs = repaired.len() - session.messages.len();
        if repairs > 0 {
            tracing::warn!(repairs, "persisting crash repairs with the new user message");
        }
        let mut new_history = repaired;
        new_history.push(Message::user(text));
        self.persist_progress(&mut session, new_history, InterruptOp::Keep)?;

        self.run_machine(&mut session, Node::Brain).await
    }

    /// Resolve a pending approval. `"yes"` executes the gated calls; any
    /// other decision declines them.
    #[tracing::instrument(level = "info", skip_all, fields(thread_id = %thread_id, decision = %decision))]
    pub async fn resume_turn(
        &self,
        thread_id: &str,
        decision: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let _turn = self.store.lock_thread(thread_id).await;

        let mut session = self
            .store
            .load(thread_id)?
            .ok_or_else(|| TurnError::UnknownThread(thread_id.to_string()))?;
        let Some(interrupt) = session.interrupt.take() else {
            return Err(TurnError::NoPendingInterrupt(thread_id.to_string()));
        };

        if decision == "yes" {
            tracing::info!(cost = interrupt.cost, "charge approved; executing gated calls");
            self.store.append(thread_id, &[], InterruptOp::Clear)?;
            return self.run_machine(&mut session, Node::Execute).await;
        }

        tracing::info!(cost = interrupt.cost, "charge declined; rolling back the gated turn");
        // The turn that requested the charge must not stay in history with
        // unresolved tool calls; replace it with a plain decline.
        if session
            .messages
            .last()
            .and_then(Message::as_assistant)
            .is_some_and(|a| !a.tool_calls.is_empty())
        {
            session.messages.pop();
        }
        let text = format!(
            "The charge of {} was declined; nothing was run. How else can I help?",
            format_cost(interrupt.cost)
        );
        session
            .messages
            .push(Message::Assistant(AssistantMessage::reply(text.clone())));
        self.store
            .rewrite(thread_id, &session.messages, InterruptOp::Clear)?;
        Ok(TurnOutcome::Completed { text })
    }

    async fn run_machine(
        &self,
        session: &mut SessionRecord,
        start: Node,
    ) -> Result<TurnOutcome, TurnError> {
        let mut node = start;
        let mut brain_calls = 0usize;
        loop {
            node = match node {
                Node::Brain => {
                    brain_calls += 1;
                    if brain_calls > self.max_tool_loops {
                        tracing::error!(
                            max_tool_loops = self.max_tool_loops,
                            "tool loop limit reached; ending turn"
                        );
                        return Ok(TurnOutcome::Completed {
                            text: "Tool loop limit reached.".to_string(),
                        });
                    }
                    self.brain_step(session).await?;
                    Node::Gate
                }
                Node::Gate => match self.gate_step(session)? {
                    GateVerdict::End { text } => return Ok(TurnOutcome::Completed { text }),
                    GateVerdict::Paused { prompt } => return Ok(TurnOutcome::Paused { prompt }),
                    GateVerdict::Execute => Node::Execute,
                },
                Node::Execute => {
                    self.execute_step(session).await?;
                    Node::Brain
                }
            };
        }
    }

    /// One model call: grounding, sanitize, invoke, persist the reply.
    async fn brain_step(&self, session: &mut SessionRecord) -> Result<(), TurnError> {
        let grounding = memory::grounding_text(&self.memory, &session.user_id);
        let preamble = self.system_prompt.replace("{user_details}", &grounding);

        let repaired = sanitize(&session.messages);
        let catalog = self.tools.catalog();

        let started = Instant::now();
        let response = self.gateway.invoke(&preamble, &repaired, &catalog).await?;
        tracing::info!(
            latency_ms = started.elapsed().as_millis() as u64,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            tool_calls = response.message.tool_calls.len(),
            content_len = response.message.text.len(),
            "model call completed"
        );

        let mut new_history = repaired;
        new_history.push(Message::Assistant(response.message));
        self.persist_progress(session, new_history, InterruptOp::Keep)
    }

    /// Approval check on the latest assistant turn; suspends when a priced
    /// call is present.
    fn gate_step(&self, session: &mut SessionRecord) -> Result<GateVerdict, TurnError> {
        let Some(assistant) = session.messages.last().and_then(Message::as_assistant) else {
            // Brain always leaves an assistant reply on top.
            return Ok(GateVerdict::End { text: String::new() });
        };

        if assistant.tool_calls.is_empty() {
            return Ok(GateVerdict::End {
                text: assistant.text.clone(),
            });
        }

        let Some(cost) = self.combined_priced_cost(&assistant.tool_calls) else {
            return Ok(GateVerdict::Execute);
        };

        let prompt = format!("Approve charge of {}?", format_cost(cost));
        let interrupt = Interrupt {
            prompt: prompt.clone(),
            cost,
        };
        self.store.append(
            &session.thread_id,
            &[],
            InterruptOp::Set(interrupt.clone()),
        )?;
        session.interrupt = Some(interrupt);
        tracing::info!(cost, "turn suspended awaiting charge approval");
        Ok(GateVerdict::Paused { prompt })
    }

    /// Combined cost of the priced calls in the turn, `None` when no call
    /// is priced. Several priced calls gate as one summed approval.
    fn combined_priced_cost(&self, calls: &[ToolCall]) -> Option<f64> {
        let mut total = None;
        for call in calls {
            if let Some(pricing) = self.tools.pricing(&call.name) {
                *total.get_or_insert(0.0) += pricing.cost_of(&call.arguments);
            }
        }
        total
    }

    /// Run every tool call of the latest assistant turn, in order. Failures
    /// become error-describing results; they never abort the turn.
    async fn execute_step(&self, session: &mut SessionRecord) -> Result<(), TurnError> {
        let calls = session
            .messages
            .last()
            .and_then(Message::as_assistant)
            .map(|a| a.tool_calls.clone())
            .unwrap_or_default();

        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            let text = match self.tools.invoke(&call.name, call.arguments.clone()).await {
                Ok(text) => text,
                Err(e) => format!("Tool execution failed: {e}"),
            };
            results.push(Message::tool_result(&call.id, text));
        }

        self.store
            .append(&session.thread_id, &results, InterruptOp::Keep)?;
        session.messages.extend(results);
        Ok(())
    }

    /// Persist the delta between the session's known history and
    /// `new_history`. Normal steps are pure appends; a repair that touched
    /// the middle of the log falls back to a full rewrite.
    fn persist_progress(
        &self,
        session: &mut SessionRecord,
        new_history: Vec<Message>,
        interrupt: InterruptOp,
    ) -> Result<(), TurnError> {
        if new_history.starts_with(&session.messages) {
            self.store.append(
                &session.thread_id,
                &new_history[session.messages.len()..],
                interrupt,
            )?;
        } else {
            self.store
                .rewrite(&session.thread_id, &new_history, interrupt)?;
        }
        session.messages = new_history;
        Ok(())
    }
}

/// Costs render with at least one decimal so "6" reads as the amount
/// "6.0" in approval prompts.
fn format_cost(cost: f64) -> String {
    if cost.fract() == 0.0 {
        format!("{cost:.1}")
    } else {
        format!("{cost}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::{INTERRUPTED_TOOL_NOTICE, is_structurally_valid};
    use async_trait::async_trait;
    use scout_llm::{ChatResponse, ScriptedGateway, Usage};
    use scout_tools::{Pricing, Tool, ToolError, ToolSpec};
    use std::sync::Mutex;

    /// Records invocations; optionally priced; optionally failing.
    struct TestTool {
        name: String,
        pricing: Option<Pricing>,
        reply: Result<String, String>,
        calls: Mutex<Vec<serde_json::Value>>,
    }

    impl TestTool {
        fn priced(name: &str, unit_cost: f64) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                pricing: Some(Pricing::per_unit(unit_cost, "job_limit")),
                reply: Ok("2 matching jobs recorded".to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn free(name: &str, reply: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                pricing: None,
                reply: Ok(reply.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &str, error: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                pricing: None,
                reply: Err(error.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn invocations(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Tool for TestTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.name.clone(),
                description: "test tool".to_string(),
                parameters_schema: serde_json::json!({ "type": "object" }),
                pricing: self.pricing.clone(),
            }
        }

        async fn execute(&self, arguments: serde_json::Value) -> scout_tools::Result<String> {
            self.calls.lock().unwrap().push(arguments);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(ToolError::ExecutionFailed(e.clone())),
            }
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        gateway: Arc<ScriptedGateway>,
        store: Arc<TurnStore>,
        memory: Arc<MemoryStore>,
        search: Arc<TestTool>,
        report: Arc<TestTool>,
        broken: Arc<TestTool>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(TurnStore::open_memory().expect("turn store"));
        let memory = Arc::new(MemoryStore::open_memory().expect("memory store"));
        let gateway = Arc::new(ScriptedGateway::new());

        let search = TestTool::priced("job_search", 2.0);
        let report = TestTool::free("read_job_report", "report contents");
        let broken = TestTool::failing("broken", "socket closed");
        let mut tools = ToolExecutor::new(30);
        tools.register(search.clone());
        tools.register(report.clone());
        tools.register(broken.clone());

        let orchestrator = Orchestrator::new(
            store.clone(),
            memory.clone(),
            gateway.clone(),
            Arc::new(tools),
            "You are Scout.\nWhat you know about this user:\n{user_details}".to_string(),
            4,
        );
        Fixture {
            orchestrator,
            gateway,
            store,
            memory,
            search,
            report,
            broken,
        }
    }

    fn reply(text: &str) -> ChatResponse {
        ChatResponse {
            message: AssistantMessage::reply(text),
            usage: Usage::default(),
        }
    }

    fn reply_with_calls(id: &str, calls: Vec<(&str, &str, serde_json::Value)>) -> ChatResponse {
        ChatResponse {
            message: AssistantMessage {
                id: id.to_string(),
                text: String::new(),
                tool_calls: calls
                    .into_iter()
                    .map(|(call_id, name, arguments)| ToolCall {
                        id: call_id.to_string(),
                        name: name.to_string(),
                        arguments,
                    })
                    .collect(),
            },
            usage: Usage::default(),
        }
    }

    #[tokio::test]
    async fn scenario_a_plain_reply_completes_without_interrupt() {
        let f = fixture();
        f.gateway.push_reply(reply("Sure - what role are you after?"));

        let outcome = f
            .orchestrator
            .start_turn("t1", "u1", "hi, can you help me find a job?")
            .await
            .expect("turn");
        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                text: "Sure - what role are you after?".to_string()
            }
        );

        let record = f.store.load("t1").expect("load").expect("exists");
        assert!(record.interrupt.is_none());
        assert_eq!(record.messages.len(), 2);
        assert!(is_structurally_valid(&record.messages));
    }

    #[tokio::test]
    async fn scenario_b_priced_call_pauses_then_approval_executes() {
        let f = fixture();
        f.gateway.push_reply(reply_with_calls(
            "a1",
            vec![(
                "call_1",
                "job_search",
                serde_json::json!({ "job_title": "engineer", "country": "uk",
                                   "location": "london", "job_limit": 3 }),
            )],
        ));

        let outcome = f
            .orchestrator
            .start_turn("t1", "u1", "find me 3 engineering jobs in london")
            .await
            .expect("turn");
        assert_eq!(
            outcome,
            TurnOutcome::Paused {
                prompt: "Approve charge of 6.0?".to_string()
            }
        );
        assert_eq!(f.search.invocations(), 0);
        let pending = f
            .store
            .load("t1")
            .expect("load")
            .expect("exists")
            .interrupt
            .expect("interrupt persisted");
        assert_eq!(pending.cost, 6.0);

        f.gateway.push_reply(reply("Done - 2 matches are in your report."));
        let outcome = f
            .orchestrator
            .resume_turn("t1", "yes")
            .await
            .expect("resume");
        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                text: "Done - 2 matches are in your report.".to_string()
            }
        );
        assert_eq!(f.search.invocations(), 1);

        // user, assistant(calls), result, final assistant: the same shape
        // an up-front approval would have produced.
        let record = f.store.load("t1").expect("load").expect("exists");
        assert!(record.interrupt.is_none());
        assert_eq!(record.messages.len(), 4);
        assert!(matches!(
            &record.messages[2],
            Message::ToolResult { tool_call_id, text }
                if tool_call_id == "call_1" && text == "2 matching jobs recorded"
        ));
        assert!(is_structurally_valid(&record.messages));
    }

    #[tokio::test]
    async fn scenario_c_decline_rolls_back_and_never_runs_the_tool() {
        let f = fixture();
        f.gateway.push_reply(reply_with_calls(
            "a1",
            vec![(
                "call_1",
                "job_search",
                serde_json::json!({ "job_limit": 3 }),
            )],
        ));

        f.orchestrator
            .start_turn("t1", "u1", "find me jobs")
            .await
            .expect("turn");
        let outcome = f
            .orchestrator
            .resume_turn("t1", "no")
            .await
            .expect("resume");

        let TurnOutcome::Completed { text } = outcome else {
            panic!("decline must complete the turn");
        };
        assert!(text.contains("declined"));
        assert!(text.contains("6.0"));
        assert_eq!(f.search.invocations(), 0);

        let record = f.store.load("t1").expect("load").expect("exists");
        assert!(record.interrupt.is_none());
        assert!(is_structurally_valid(&record.messages));
        // The gated turn is gone; no assistant message carries tool calls.
        assert!(
            record
                .messages
                .iter()
                .filter_map(Message::as_assistant)
                .all(|a| a.tool_calls.is_empty())
        );
        assert!(matches!(
            record.messages.last().expect("decline message"),
            Message::Assistant(a) if a.text.contains("declined")
        ));
    }

    #[tokio::test]
    async fn scenario_d_dangling_history_is_repaired_not_reexecuted() {
        let f = fixture();
        // Simulate a crash: a persisted assistant turn whose tool call has
        // no result.
        f.store.create("t1", "u1").expect("create");
        f.store
            .append(
                "t1",
                &[
                    Message::user("find me jobs"),
                    Message::Assistant(AssistantMessage {
                        id: "a0".to_string(),
                        text: String::new(),
                        tool_calls: vec![ToolCall {
                            id: "call_0".to_string(),
                            name: "job_search".to_string(),
                            arguments: serde_json::json!({ "job_limit": 2 }),
                        }],
                    }),
                ],
                InterruptOp::Keep,
            )
            .expect("seed");

        f.gateway.push_reply(reply("Something went wrong earlier; want me to retry?"));
        let outcome = f
            .orchestrator
            .start_turn("t1", "u1", "did that work?")
            .await
            .expect("turn");
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));

        // The tool was never re-invoked; the model saw a synthesized
        // failure result instead.
        assert_eq!(f.search.invocations(), 0);
        let calls = f.gateway.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].history.iter().any(|m| matches!(
            m,
            Message::ToolResult { tool_call_id, text }
                if tool_call_id == "call_0" && text == INTERRUPTED_TOOL_NOTICE
        )));

        // And the repair is durable.
        let record = f.store.load("t1").expect("load").expect("exists");
        assert!(is_structurally_valid(&record.messages));
        assert!(record.messages.iter().any(|m| matches!(
            m,
            Message::ToolResult { text, .. } if text == INTERRUPTED_TOOL_NOTICE
        )));
    }

    #[tokio::test]
    async fn gateway_failure_persists_nothing_from_the_step() {
        let f = fixture();
        f.gateway
            .push_failure(LlmError::Http("connection reset".to_string()));

        let err = f
            .orchestrator
            .start_turn("t1", "u1", "hello")
            .await
            .expect_err("gateway failure surfaces");
        assert!(matches!(err, TurnError::Gateway(_)));

        // The user message (persisted before the call) is intact; no
        // partial assistant message landed.
        let record = f.store.load("t1").expect("load").expect("exists");
        assert_eq!(record.messages, vec![Message::user("hello")]);

        // A clean retry works.
        f.gateway.push_reply(reply("hi!"));
        let outcome = f
            .orchestrator
            .start_turn("t1", "u1", "hello again")
            .await
            .expect("retry");
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn resume_without_pending_interrupt_is_rejected() {
        let f = fixture();
        f.gateway.push_reply(reply("hello"));
        f.orchestrator
            .start_turn("t1", "u1", "hi")
            .await
            .expect("turn");

        let err = f
            .orchestrator
            .resume_turn("t1", "yes")
            .await
            .expect_err("nothing to resume");
        assert!(matches!(err, TurnError::NoPendingInterrupt(_)));

        let err = f
            .orchestrator
            .resume_turn("ghost", "yes")
            .await
            .expect_err("unknown thread");
        assert!(matches!(err, TurnError::UnknownThread(_)));
    }

    #[tokio::test]
    async fn start_turn_with_pending_interrupt_is_rejected() {
        let f = fixture();
        f.gateway.push_reply(reply_with_calls(
            "a1",
            vec![("call_1", "job_search", serde_json::json!({}))],
        ));
        f.orchestrator
            .start_turn("t1", "u1", "find jobs")
            .await
            .expect("turn");

        let err = f
            .orchestrator
            .start_turn("t1", "u1", "actually wait")
            .await
            .expect_err("must resolve the approval first");
        assert!(matches!(err, TurnError::InterruptPending(_)));
    }

    #[tokio::test]
    async fn free_tool_calls_run_without_approval() {
        let f = fixture();
        f.gateway.push_reply(reply_with_calls(
            "a1",
            vec![("call_1", "read_job_report", serde_json::json!({}))],
        ));
        f.gateway.push_reply(reply("Your report lists 2 matches."));

        let outcome = f
            .orchestrator
            .start_turn("t1", "u1", "what did you find so far?")
            .await
            .expect("turn");
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        assert_eq!(f.report.invocations(), 1);
        assert!(f.store.load("t1").expect("load").expect("exists").interrupt.is_none());
    }

    #[tokio::test]
    async fn multiple_priced_calls_gate_as_one_summed_approval() {
        let f = fixture();
        f.gateway.push_reply(reply_with_calls(
            "a1",
            vec![
                ("call_1", "job_search", serde_json::json!({ "job_limit": 1 })),
                ("call_2", "job_search", serde_json::json!({ "job_limit": 2 })),
            ],
        ));

        let outcome = f
            .orchestrator
            .start_turn("t1", "u1", "search twice")
            .await
            .expect("turn");
        assert_eq!(
            outcome,
            TurnOutcome::Paused {
                prompt: "Approve charge of 6.0?".to_string()
            }
        );
    }

    #[tokio::test]
    async fn missing_quantity_defaults_to_one_unit() {
        let f = fixture();
        f.gateway.push_reply(reply_with_calls(
            "a1",
            vec![(
                "call_1",
                "job_search",
                serde_json::json!({ "job_title": "engineer" }),
            )],
        ));

        let outcome = f
            .orchestrator
            .start_turn("t1", "u1", "find a job")
            .await
            .expect("turn");
        assert_eq!(
            outcome,
            TurnOutcome::Paused {
                prompt: "Approve charge of 2.0?".to_string()
            }
        );
    }

    #[tokio::test]
    async fn tool_failure_becomes_a_result_never_a_crash() {
        let f = fixture();
        f.gateway.push_reply(reply_with_calls(
            "a1",
            vec![("call_1", "broken", serde_json::json!({}))],
        ));
        f.gateway.push_reply(reply("That tool is unavailable right now."));

        let outcome = f
            .orchestrator
            .start_turn("t1", "u1", "run the broken one")
            .await
            .expect("turn still completes");
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));

        let record = f.store.load("t1").expect("load").expect("exists");
        assert!(record.messages.iter().any(|m| matches!(
            m,
            Message::ToolResult { text, .. }
                if text.contains("Tool execution failed") && text.contains("socket closed")
        )));
        assert!(is_structurally_valid(&record.messages));
    }

    #[tokio::test]
    async fn runaway_tool_loop_is_cut_off() {
        let f = fixture();
        for i in 0..5 {
            let message_id = format!("a{i}");
            let call_id = format!("call_{i}");
            f.gateway.push_reply(reply_with_calls(
                &message_id,
                vec![(call_id.as_str(), "read_job_report", serde_json::json!({}))],
            ));
        }

        let outcome = f
            .orchestrator
            .start_turn("t1", "u1", "loop forever")
            .await
            .expect("turn");
        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                text: "Tool loop limit reached.".to_string()
            }
        );
        // Four Brain steps ran; the fifth was cut off.
        assert_eq!(f.gateway.recorded_calls().len(), 4);
    }

    #[tokio::test]
    async fn brain_preamble_carries_user_grounding() {
        let f = fixture();
        f.memory
            .add_fact("u1", "prefers remote roles")
            .expect("seed fact");
        f.gateway.push_reply(reply("noted"));

        f.orchestrator
            .start_turn("t1", "u1", "hello")
            .await
            .expect("turn");

        let calls = f.gateway.recorded_calls();
        assert!(calls[0].system_preamble.contains("prefers remote roles"));
    }

    #[tokio::test]
    async fn unknown_user_grounding_is_the_empty_sentinel() {
        let f = fixture();
        f.gateway.push_reply(reply("hello"));

        f.orchestrator
            .start_turn("t1", "stranger", "hi")
            .await
            .expect("turn");
        let calls = f.gateway.recorded_calls();
        assert!(calls[0].system_preamble.contains("(empty)"));
    }

    #[test]
    fn costs_always_render_with_a_decimal() {
        assert_eq!(format_cost(6.0), "6.0");
        assert_eq!(format_cost(2.0), "2.0");
        assert_eq!(format_cost(6.25), "6.25");
    }
}
