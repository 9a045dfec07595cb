//! The outer request→model→tools→events loop that ties every other
//! component together (spec §4.12, C12).

use std::sync::Arc;

use agent_error::ErrorExt;
use agent_error::Location;
use agent_error::StatusCode;
use agent_error::fmt_error_chain;
use futures::future::join_all;
use serde_json::Value;
use snafu::Snafu;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::budget::BudgetAxis;
use crate::budget::BudgetTracker;
use crate::budget::ExtensionHandler;
use crate::budget::StopReason;
use crate::budget::Suggestion;
use crate::config::ExecutionBudget;
use crate::config::ExecutionUsage;
use crate::ids::AtomicCounter;
use crate::llm::ChatOptions;
use crate::llm::LlmProvider;
use crate::llm::Message;
use crate::llm::Role;
use crate::llm::ToolRegistry;
use crate::pricing::PricingFn;
use crate::pricing::default_pricing_fn;
use crate::protocol::AgentEvent;
use crate::protocol::DoomLoopScope;
use crate::protocol::EventEnvelope;
use crate::protocol::EventId;
use crate::protocol::MessageId;
use crate::protocol::SubmissionId;
use crate::queue::EventQueue;
use crate::scheduler;

#[derive(Snafu)]
#[snafu(visibility(pub(crate)), module)]
pub enum AgentLoopError {
    #[snafu(display("agent loop has no LLM provider configured"))]
    MissingLlmProvider {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("agent loop has no tool registry configured"))]
    MissingToolRegistry {
        #[snafu(implicit)]
        location: Location,
    },
}

impl std::fmt::Debug for AgentLoopError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_error_chain(self, f)
    }
}

impl ErrorExt for AgentLoopError {
    fn status_code(&self) -> StatusCode {
        StatusCode::InvalidArguments
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub type Result<T> = std::result::Result<T, AgentLoopError>;

/// One submission's worth of input to the loop.
#[derive(Clone)]
pub struct RunRequest {
    pub submission_id: SubmissionId,
    pub content: String,
    pub model: String,
    pub budget: ExecutionBudget,
    pub cancel: CancellationToken,
}

/// How a run ended (spec §4.12 steps 2d, 3, and §5 cancellation).
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    Completed { content: String },
    IterationsExhausted,
    Cancelled,
    BudgetStopped { reason: StopReason },
    LlmCallFailed { message: String },
}

/// The full result of one `run()` call.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub outcome: LoopOutcome,
    pub usage: ExecutionUsage,
    pub messages: Vec<Message>,
}

/// Builds an [`AgentLoop`] from its required external collaborators (spec
/// §6/§9: no inheritance hierarchy, just the two injected interfaces).
#[derive(Default)]
pub struct AgentLoopBuilder {
    llm: Option<Arc<dyn LlmProvider>>,
    tools: Option<Arc<dyn ToolRegistry>>,
    pricing: Option<PricingFn>,
    extension_handler: Option<ExtensionHandler>,
}

impl AgentLoopBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn tools(mut self, tools: Arc<dyn ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn pricing(mut self, pricing: PricingFn) -> Self {
        self.pricing = Some(pricing);
        self
    }

    /// Installs the collaborator that approves or denies budget extension
    /// requests (spec §4.5d). Without one, every extension request is
    /// denied.
    pub fn extension_handler(mut self, handler: ExtensionHandler) -> Self {
        self.extension_handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<AgentLoop> {
        Ok(AgentLoop {
            llm: self.llm.ok_or_else(|| agent_loop_error::MissingLlmProviderSnafu.build())?,
            tools: self
                .tools
                .ok_or_else(|| agent_loop_error::MissingToolRegistrySnafu.build())?,
            pricing: self.pricing.unwrap_or_else(default_pricing_fn),
            extension_handler: self.extension_handler,
            event_ids: AtomicCounter::new(),
            message_ids: AtomicCounter::new(),
        })
    }
}

/// Ties together the model, the tool registry, the scheduler (C7), and the
/// budget tracker (C5) into the per-submission loop (spec §4.12).
pub struct AgentLoop {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolRegistry>,
    pricing: PricingFn,
    extension_handler: Option<ExtensionHandler>,
    event_ids: AtomicCounter,
    message_ids: AtomicCounter,
}

impl AgentLoop {
    fn emit(&self, events: &EventQueue, submission_id: Option<SubmissionId>, event: AgentEvent) {
        events.emit(EventEnvelope {
            event_id: EventId::from_counter(&self.event_ids),
            submission_id,
            timestamp: chrono::Utc::now(),
            event,
        });
    }

    fn next_message_id(&self) -> MessageId {
        MessageId::from_counter(&self.message_ids)
    }

    /// Runs one submission to completion (spec §4.12). Emits progress and
    /// terminal events onto `events`, correlated to `request.submission_id`.
    pub async fn run(&self, request: RunRequest, events: &EventQueue) -> RunResult {
        let mut tracker = BudgetTracker::new(request.budget, self.pricing.clone());
        if let Some(handler) = self.extension_handler.clone() {
            tracker = tracker.with_extension_handler(handler);
        }
        let mut messages = vec![Message {
            id: self.next_message_id(),
            role: Role::User,
            content: request.content.clone(),
            tool_calls: None,
            tool_call_id: None,
            timestamp: chrono::Utc::now(),
        }];

        loop {
            if request.cancel.is_cancelled() {
                return self.finish(LoopOutcome::Cancelled, &tracker, messages, &request, events);
            }
            if tracker.usage().iterations >= request.budget.max_iterations {
                return self.finish(LoopOutcome::IterationsExhausted, &tracker, messages, &request, events);
            }

            let options = ChatOptions {
                tools: self.tools.schemas(),
                model: Some(request.model.clone()),
            };
            let response = match self.llm.chat_with_tools(&messages, &options).await {
                Ok(response) => response,
                Err(err) => {
                    self.emit(
                        events,
                        Some(request.submission_id.clone()),
                        AgentEvent::Error {
                            code: "LLM_CALL_FAILED".to_string(),
                            message: err.to_string(),
                            recoverable: true,
                            stack: Some(format!("{err:?}")),
                        },
                    );
                    return self.finish(
                        LoopOutcome::LlmCallFailed { message: err.to_string() },
                        &tracker,
                        messages,
                        &request,
                        events,
                    );
                }
            };
            tracker.record_llm(response.usage.input, response.usage.output, Some(&request.model), response.cost);
            if let Some(outcome) = self.evaluate_budget(&tracker, &request, events).await {
                return self.finish(outcome, &tracker, messages, &request, events);
            }

            let tool_calls = match response.tool_calls {
                Some(calls) if !calls.is_empty() => calls,
                _ => {
                    self.emit(
                        events,
                        Some(request.submission_id.clone()),
                        AgentEvent::AgentMessage {
                            content: response.content.clone(),
                            done: true,
                        },
                    );
                    return self.finish(
                        LoopOutcome::Completed { content: response.content },
                        &tracker,
                        messages,
                        &request,
                        events,
                    );
                }
            };

            messages.push(Message {
                id: self.next_message_id(),
                role: Role::Assistant,
                content: response.content,
                tool_calls: Some(tool_calls.clone()),
                tool_call_id: None,
                timestamp: chrono::Utc::now(),
            });

            let calls: Vec<scheduler::ToolCall> = tool_calls
                .iter()
                .map(|call| {
                    let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
                    scheduler::ToolCall::new(call.function.name.clone(), args)
                })
                .collect();
            let batches = scheduler::schedule(calls);

            let mut call_cursor = 0usize;
            for batch in batches {
                if request.cancel.is_cancelled() {
                    return self.finish(LoopOutcome::Cancelled, &tracker, messages, &request, events);
                }

                let batch_requests = &tool_calls[call_cursor..call_cursor + batch.len()];
                call_cursor += batch.len();

                let futures = batch.iter().zip(batch_requests.iter()).map(|(call, request_meta)| {
                    let name = call.tool.clone();
                    let args = call.args.clone();
                    let call_id = request_meta.id.clone();
                    async move {
                        self.emit(
                            events,
                            None,
                            AgentEvent::ToolStarted {
                                call_id: call_id.clone(),
                                name: name.clone(),
                            },
                        );
                        let outcome = self.tools.execute(&name, &args).await;
                        self.emit(
                            events,
                            None,
                            AgentEvent::ToolFinished {
                                call_id: call_id.clone(),
                                name: name.clone(),
                                success: outcome.success,
                            },
                        );
                        (call_id, name, args, outcome)
                    }
                });

                for (call_id, name, args, outcome) in join_all(futures).await {
                    tracker.record_tool(&name, &args.to_string(), outcome.success);
                    messages.push(Message {
                        id: self.next_message_id(),
                        role: Role::Tool,
                        content: outcome.output,
                        tool_calls: None,
                        tool_call_id: Some(call_id),
                        timestamp: chrono::Utc::now(),
                    });
                }
            }

            if let Some(outcome) = self.evaluate_budget(&tracker, &request, events).await {
                return self.finish(outcome, &tracker, messages, &request, events);
            }
        }
    }

    /// Runs the budget priority ladder (spec §4.5c) after the latest usage
    /// has been recorded, emitting doom-loop/warning/extension events along
    /// the way. Returns `Some(outcome)` when the run must stop.
    async fn evaluate_budget(&self, tracker: &BudgetTracker, request: &RunRequest, events: &EventQueue) -> Option<LoopOutcome> {
        let check = tracker.check_budget();
        if let Some((_, fingerprint)) = &check.local_doom_loop {
            self.emit(
                events,
                Some(request.submission_id.clone()),
                AgentEvent::DoomLoopDetected {
                    scope: DoomLoopScope::Local,
                    fingerprint: fingerprint.clone(),
                },
            );
        }
        if check.suggestion == Some(Suggestion::Warn) {
            self.emit(
                events,
                Some(request.submission_id.clone()),
                AgentEvent::BudgetWarning {
                    message: "soft cost threshold exceeded".to_string(),
                },
            );
        }
        if check.suggestion == Some(Suggestion::RequestExtension) {
            let reason = format!(
                "soft threshold or stuck_count={} reached at usage={:?}",
                check.stuck_count,
                tracker.usage()
            );
            let extension = tracker.request_extension(reason).await;
            if extension.granted {
                self.emit(
                    events,
                    Some(request.submission_id.clone()),
                    AgentEvent::BudgetWarning {
                        message: format!("budget extension granted: {}", extension.request.reason),
                    },
                );
            } else {
                self.emit(
                    events,
                    Some(request.submission_id.clone()),
                    AgentEvent::Error {
                        code: "BUDGET_EXCEEDED".to_string(),
                        message: format!("budget extension denied: {}", extension.request.reason),
                        recoverable: false,
                        stack: None,
                    },
                );
                return Some(LoopOutcome::BudgetStopped {
                    reason: StopReason::Budget { axis: BudgetAxis::Tokens, hard: false },
                });
            }
        }
        if !check.can_continue {
            let reason = check.stop_reason.expect("hard stop always carries a reason");
            if let StopReason::GlobalDoomLoop { fingerprint } = &reason {
                self.emit(
                    events,
                    Some(request.submission_id.clone()),
                    AgentEvent::DoomLoopDetected {
                        scope: DoomLoopScope::Global,
                        fingerprint: fingerprint.clone(),
                    },
                );
            }
            self.emit(
                events,
                Some(request.submission_id.clone()),
                AgentEvent::Error {
                    code: "BUDGET_EXCEEDED".to_string(),
                    message: format!("{reason:?}"),
                    recoverable: false,
                    stack: None,
                },
            );
            return Some(LoopOutcome::BudgetStopped { reason });
        }
        None
    }

    fn finish(
        &self,
        outcome: LoopOutcome,
        tracker: &BudgetTracker,
        messages: Vec<Message>,
        request: &RunRequest,
        events: &EventQueue,
    ) -> RunResult {
        if matches!(outcome, LoopOutcome::IterationsExhausted) {
            self.emit(
                events,
                Some(request.submission_id.clone()),
                AgentEvent::Error {
                    code: "ITERATIONS_EXHAUSTED".to_string(),
                    message: "the run exhausted its maximum iteration count".to_string(),
                    recoverable: false,
                    stack: None,
                },
            );
        }
        if matches!(outcome, LoopOutcome::Cancelled) {
            warn!(submission_id = %request.submission_id, "agent loop run cancelled");
        }
        RunResult {
            outcome,
            usage: tracker.usage(),
            messages,
        }
    }
}

#[cfg(test)]
#[path = "agentloop.test.rs"]
mod tests;
