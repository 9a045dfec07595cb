use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;

use super::*;
use crate::blackboard::Blackboard;
use crate::blackboard::FindingType;
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
use crate::protocol::AgentId as ProtoAgentId;
use crate::protocol::TaskId;

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
    calls: StdMutex<Vec<String>>,
}

impl StaticTools {
    fn new(output: impl Into<String>, success: bool) -> Self {
        Self {
            output: output.into(),
            success,
            calls: StdMutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ToolRegistry for StaticTools {
    async fn execute(&self, name: &str, _args: &Value) -> ToolOutcome {
        self.calls.lock().unwrap().push(name.to_string());
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

fn tool_call_response(tool: &str, args: serde_json::Value) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls: Some(vec![ToolCallRequest {
            id: "call-1".to_string(),
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

fn request(description: &str, timeout: Duration) -> SpawnRequest {
    SpawnRequest {
        task_id: None,
        description: description.to_string(),
        name: "explorer".to_string(),
        model: "gpt-4o-mini".to_string(),
        timeout,
        budget: ExecutionBudget::default(),
        topic_patterns: vec!["*".to_string()],
    }
}

#[tokio::test]
async fn spawn_returns_final_message_when_there_are_no_tool_calls() {
    let llm = Arc::new(ScriptedLlm::new(vec![finish_response("all done")]));
    let tools = Arc::new(StaticTools::new("ok", true));
    let spawner = SubagentSpawner::new(5, llm, tools);

    let result = spawner.spawn(request("investigate", Duration::from_secs(5))).await;
    assert!(result.success);
    assert_eq!(result.message, "all done");
    assert_eq!(result.iterations, 1);
}

#[tokio::test]
async fn discovery_tool_call_posts_a_finding() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        tool_call_response("grep", json!({"pattern": "TODO"})),
        finish_response("found it"),
    ]));
    let tools = Arc::new(StaticTools::new("matched lines", true));
    let board = Blackboard::new();
    let spawner = SubagentSpawner::new(5, llm, tools).with_blackboard(board.clone());

    let result = spawner.spawn(request("search for TODOs", Duration::from_secs(5))).await;
    assert!(result.success);
    assert_eq!(result.findings.as_ref().map(|f| f.len()), Some(1));
    let discoveries = board.query(None, Some(FindingType::Discovery));
    assert_eq!(discoveries.len(), 1);
    assert_eq!(discoveries[0].content, "matched lines");
}

#[tokio::test]
async fn write_tool_call_claims_then_releases_the_resource() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        tool_call_response("write_file", json!({"path": "/a.rs", "content": "x"})),
        finish_response("wrote it"),
    ]));
    let tools = Arc::new(StaticTools::new("wrote 1 file", true));
    let board = Blackboard::new();
    let spawner = SubagentSpawner::new(5, llm, tools).with_blackboard(board.clone());

    let result = spawner.spawn(request("write the file", Duration::from_secs(5))).await;
    assert!(result.success);
    assert_eq!(result.files_modified, Some(vec!["/a.rs".to_string()]));
    assert_eq!(board.is_claimed("/a.rs"), None);
}

#[tokio::test]
async fn resource_conflict_skips_execution_and_synthesizes_a_failure() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        tool_call_response("write_file", json!({"path": "/a.rs", "content": "x"})),
        finish_response("gave up"),
    ]));
    let tools = Arc::new(StaticTools::new("should not run", true));
    let board = Blackboard::new();
    board.claim("/a.rs", ProtoAgentId("other-agent".to_string()));
    let spawner = SubagentSpawner::new(5, llm, tools).with_blackboard(board.clone());

    let result = spawner.spawn(request("write the file", Duration::from_secs(5))).await;
    assert!(result.success);
    assert_eq!(result.files_modified, None);
}

#[tokio::test]
async fn timeout_produces_a_failed_result() {
    struct StallingLlm;
    #[async_trait]
    impl LlmProvider for StallingLlm {
        async fn chat_with_tools(&self, _messages: &[Message], _options: &ChatOptions) -> anyhow::Result<ChatResponse> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(finish_response("too slow"))
        }
    }
    let llm = Arc::new(StallingLlm);
    let tools = Arc::new(StaticTools::new("ok", true));
    let spawner = SubagentSpawner::new(5, llm, tools);

    let result = spawner.spawn(request("hang", Duration::from_millis(20))).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("Timeout"));
}

#[tokio::test]
async fn run_parallel_keys_results_by_task_id() {
    let llm = Arc::new(ScriptedLlm::new(vec![finish_response("one"), finish_response("two")]));
    let tools = Arc::new(StaticTools::new("ok", true));
    let spawner = SubagentSpawner::new(5, llm, tools);

    let task_a: TaskId = "task-a".into();
    let task_b: TaskId = "task-b".into();
    let mut first = request("task a", Duration::from_secs(5));
    first.task_id = Some(task_a.clone());
    let mut second = request("task b", Duration::from_secs(5));
    second.task_id = Some(task_b.clone());

    let results = spawner.run_parallel(vec![first, second]).await;
    assert_eq!(results.len(), 2);
    assert!(results.contains_key(&task_a));
    assert!(results.contains_key(&task_b));
}

#[tokio::test]
async fn run_parallel_drops_requests_with_no_task_id() {
    let llm = Arc::new(ScriptedLlm::new(vec![finish_response("done")]));
    let tools = Arc::new(StaticTools::new("ok", true));
    let spawner = SubagentSpawner::new(5, llm, tools);

    let results = spawner.run_parallel(vec![request("orphan", Duration::from_secs(5))]).await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn spawn_without_a_blackboard_runs_to_completion() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        tool_call_response("write_file", json!({"path": "/a.rs", "content": "x"})),
        finish_response("wrote it"),
    ]));
    let tools = Arc::new(StaticTools::new("wrote 1 file", true));
    let spawner = SubagentSpawner::new(5, llm, tools);

    let result = spawner.spawn(request("write without coordination", Duration::from_secs(5))).await;
    assert!(result.success);
    assert_eq!(result.files_modified, Some(vec!["/a.rs".to_string()]));
}
