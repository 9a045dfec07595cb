use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use agent_error::ErrorExt;

use super::*;
use crate::budget::BudgetAxis;
use crate::budget::StopReason;
use crate::config::ExecutionBudget;
use crate::llm::ChatOptions;
use crate::llm::ChatResponse;
use crate::llm::FunctionCall;
use crate::llm::LlmProvider;
use crate::llm::Message;
use crate::llm::ToolCallRequest;
use crate::llm::ToolOutcome;
use crate::llm::ToolRegistry;
use crate::llm::ToolSchema;
use crate::llm::Usage;
use crate::protocol::AgentEvent;
use crate::protocol::EventKind;
use crate::protocol::SubmissionId;
use crate::queue::EventQueue;

struct ScriptedLlm {
    responses: StdMutex<VecDeque<ChatResponse>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: StdMutex::new(responses.into_iter().collect()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn chat_with_tools(&self, _messages: &[Message], _options: &ChatOptions) -> anyhow::Result<ChatResponse> {
        let mut queue = self.responses.lock().unwrap();
        Ok(queue.pop_front().unwrap_or(ChatResponse {
            content: "done".to_string(),
            tool_calls: None,
            usage: Usage::default(),
            stop_reason: "stop".to_string(),
            cost: None,
        }))
    }
}

struct StaticTools {
    output: String,
    success: bool,
}

#[async_trait]
impl ToolRegistry for StaticTools {
    async fn execute(&self, _name: &str, _args: &Value) -> ToolOutcome {
        ToolOutcome {
            success: self.success,
            output: self.output.clone(),
        }
    }

    fn schemas(&self) -> Vec<ToolSchema> {
        Vec::new()
    }
}

fn finish_response(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_string(),
        tool_calls: None,
        usage: Usage { input: 10, output: 5, cached: None },
        stop_reason: "stop".to_string(),
        cost: None,
    }
}

fn tool_call_response(id: &str, tool: &str, args: serde_json::Value) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls: Some(vec![ToolCallRequest {
            id: id.to_string(),
            function: FunctionCall {
                name: tool.to_string(),
                arguments: args.to_string(),
            },
        }]),
        usage: Usage { input: 10, output: 5, cached: None },
        stop_reason: "tool_calls".to_string(),
        cost: None,
    }
}

fn request(budget: ExecutionBudget) -> RunRequest {
    RunRequest {
        submission_id: SubmissionId::from("sub-1"),
        content: "do the thing".to_string(),
        model: "gpt-4o-mini".to_string(),
        budget,
        cancel: CancellationToken::new(),
    }
}

#[tokio::test]
async fn completes_and_emits_a_done_agent_message_when_there_are_no_tool_calls() {
    let llm = Arc::new(ScriptedLlm::new(vec![finish_response("all done")]));
    let tools = Arc::new(StaticTools { output: "ok".to_string(), success: true });
    let agent_loop = AgentLoopBuilder::new().llm(llm).tools(tools).build().unwrap();
    let events = EventQueue::new();

    let result = agent_loop.run(request(ExecutionBudget::default()), &events).await;
    assert_eq!(result.outcome, LoopOutcome::Completed { content: "all done".to_string() });

    let recent = events.get_recent(10);
    assert!(recent.iter().any(|e| matches!(e.event, AgentEvent::AgentMessage { done: true, .. })));
}

#[tokio::test]
async fn runs_a_tool_call_and_records_it_on_the_tracker() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        tool_call_response("call-1", "read_file", json!({"path": "/a.rs"})),
        finish_response("read it"),
    ]));
    let tools = Arc::new(StaticTools { output: "file contents".to_string(), success: true });
    let agent_loop = AgentLoopBuilder::new().llm(llm).tools(tools).build().unwrap();
    let events = EventQueue::new();

    let result = agent_loop.run(request(ExecutionBudget::default()), &events).await;
    assert_eq!(result.outcome, LoopOutcome::Completed { content: "read it".to_string() });
    assert_eq!(result.usage.tool_calls, 1);
    assert_eq!(result.usage.iterations, 2);

    let recent = events.get_recent(10);
    assert!(recent.iter().any(|e| e.event.kind() == EventKind::ToolStarted));
    assert!(recent.iter().any(|e| e.event.kind() == EventKind::ToolFinished));
}

#[tokio::test]
async fn exhausting_iterations_returns_a_structured_failure() {
    let responses: Vec<ChatResponse> = (0..10)
        .map(|i| tool_call_response(&format!("call-{i}"), "read_file", json!({"path": format!("/f{i}")})))
        .collect();
    let llm = Arc::new(ScriptedLlm::new(responses));
    let tools = Arc::new(StaticTools { output: "ok".to_string(), success: true });
    let agent_loop = AgentLoopBuilder::new().llm(llm).tools(tools).build().unwrap();
    let events = EventQueue::new();

    let mut budget = ExecutionBudget::default();
    budget.max_iterations = 3;
    budget.soft_token_threshold = budget.max_tokens;

    let result = agent_loop.run(request(budget), &events).await;
    assert_eq!(result.outcome, LoopOutcome::IterationsExhausted);

    let recent = events.get_recent(10);
    assert!(recent.iter().any(|e| matches!(&e.event, AgentEvent::Error { code, .. } if code == "ITERATIONS_EXHAUSTED")));
}

#[tokio::test]
async fn a_hard_token_cap_stops_the_run_with_a_budget_event() {
    let llm = Arc::new(ScriptedLlm::new(vec![finish_response("should not be reached")]));
    let tools = Arc::new(StaticTools { output: "ok".to_string(), success: true });
    let agent_loop = AgentLoopBuilder::new().llm(llm).tools(tools).build().unwrap();
    let events = EventQueue::new();

    let mut budget = ExecutionBudget::default();
    budget.max_tokens = 1;
    budget.soft_token_threshold = 0;

    let result = agent_loop.run(request(budget), &events).await;
    match result.outcome {
        LoopOutcome::BudgetStopped { reason: StopReason::Budget { axis, hard } } => {
            assert_eq!(axis, BudgetAxis::Tokens);
            assert!(hard);
        }
        other => panic!("expected a hard token stop, got {other:?}"),
    }

    let recent = events.get_recent(10);
    assert!(recent.iter().any(|e| matches!(&e.event, AgentEvent::Error { code, .. } if code == "BUDGET_EXCEEDED")));
}

#[tokio::test]
async fn a_soft_token_threshold_with_no_extension_handler_is_denied_and_stops_the_run() {
    let llm = Arc::new(ScriptedLlm::new(vec![finish_response("should not be reached")]));
    let tools = Arc::new(StaticTools { output: "ok".to_string(), success: true });
    let agent_loop = AgentLoopBuilder::new().llm(llm).tools(tools).build().unwrap();
    let events = EventQueue::new();

    let mut budget = ExecutionBudget::default();
    budget.soft_token_threshold = 0;

    let result = agent_loop.run(request(budget), &events).await;
    match result.outcome {
        LoopOutcome::BudgetStopped { reason: StopReason::Budget { axis, hard } } => {
            assert_eq!(axis, BudgetAxis::Tokens);
            assert!(!hard);
        }
        other => panic!("expected a denied-extension stop, got {other:?}"),
    }

    let recent = events.get_recent(10);
    assert!(recent.iter().any(|e| matches!(&e.event, AgentEvent::Error { code, .. } if code == "BUDGET_EXCEEDED")));
}

#[tokio::test]
async fn a_granted_extension_lets_the_run_continue_to_completion() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        tool_call_response("call-1", "read_file", json!({"path": "/a.rs"})),
        finish_response("finished after extension"),
    ]));
    let tools = Arc::new(StaticTools { output: "file contents".to_string(), success: true });
    let agent_loop = AgentLoopBuilder::new()
        .llm(llm)
        .tools(tools)
        .extension_handler(Arc::new(|_request| Box::pin(async { true })))
        .build()
        .unwrap();
    let events = EventQueue::new();

    let mut budget = ExecutionBudget::default();
    budget.soft_token_threshold = 0;

    let result = agent_loop.run(request(budget), &events).await;
    assert_eq!(result.outcome, LoopOutcome::Completed { content: "finished after extension".to_string() });

    let recent = events.get_recent(10);
    assert!(recent.iter().any(|e| matches!(&e.event, AgentEvent::BudgetWarning { message } if message.contains("granted"))));
}

#[tokio::test]
async fn a_provider_error_produces_a_distinct_outcome_from_iterations_exhausted() {
    struct FailingLlm;
    #[async_trait]
    impl LlmProvider for FailingLlm {
        async fn chat_with_tools(&self, _messages: &[Message], _options: &ChatOptions) -> anyhow::Result<ChatResponse> {
            Err(anyhow::anyhow!("upstream unavailable"))
        }
    }
    let llm = Arc::new(FailingLlm);
    let tools = Arc::new(StaticTools { output: "ok".to_string(), success: true });
    let agent_loop = AgentLoopBuilder::new().llm(llm).tools(tools).build().unwrap();
    let events = EventQueue::new();

    let result = agent_loop.run(request(ExecutionBudget::default()), &events).await;
    match result.outcome {
        LoopOutcome::LlmCallFailed { message } => assert!(message.contains("upstream unavailable")),
        other => panic!("expected LlmCallFailed, got {other:?}"),
    }

    let recent = events.get_recent(10);
    assert!(recent.iter().any(|e| matches!(&e.event, AgentEvent::Error { code, .. } if code == "LLM_CALL_FAILED")));
    assert!(!recent.iter().any(|e| matches!(&e.event, AgentEvent::Error { code, .. } if code == "ITERATIONS_EXHAUSTED")));
}

#[tokio::test]
async fn a_cancelled_token_short_circuits_before_the_first_model_call() {
    let llm = Arc::new(ScriptedLlm::new(vec![finish_response("should not be reached")]));
    let tools = Arc::new(StaticTools { output: "ok".to_string(), success: true });
    let agent_loop = AgentLoopBuilder::new().llm(llm).tools(tools).build().unwrap();
    let events = EventQueue::new();

    let mut req = request(ExecutionBudget::default());
    req.cancel.cancel();

    let result = agent_loop.run(req, &events).await;
    assert_eq!(result.outcome, LoopOutcome::Cancelled);
}

#[test]
fn builder_requires_both_collaborators() {
    let err = AgentLoopBuilder::new().build().unwrap_err();
    assert_eq!(err.status_code(), agent_error::StatusCode::InvalidArguments);
}

#[tokio::test]
async fn parallel_read_batch_preserves_message_order() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        ChatResponse {
            content: String::new(),
            tool_calls: Some(vec![
                ToolCallRequest {
                    id: "call-a".to_string(),
                    function: FunctionCall { name: "read_file".to_string(), arguments: json!({"path": "/a"}).to_string() },
                },
                ToolCallRequest {
                    id: "call-b".to_string(),
                    function: FunctionCall { name: "read_file".to_string(), arguments: json!({"path": "/b"}).to_string() },
                },
            ]),
            usage: Usage { input: 10, output: 5, cached: None },
            stop_reason: "tool_calls".to_string(),
            cost: None,
        },
        finish_response("both read"),
    ]));
    let tools = Arc::new(StaticTools { output: "ok".to_string(), success: true });
    let agent_loop = AgentLoopBuilder::new().llm(llm).tools(tools).build().unwrap();
    let events = EventQueue::new();

    let result = agent_loop.run(request(ExecutionBudget::default()), &events).await;
    let tool_call_ids: Vec<_> = result
        .messages
        .iter()
        .filter_map(|m| m.tool_call_id.clone())
        .collect();
    assert_eq!(tool_call_ids, vec!["call-a".to_string(), "call-b".to_string()]);
    let _ = Duration::from_secs(0);
}
