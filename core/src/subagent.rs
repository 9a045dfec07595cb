//! Per-task subagent lifecycle: spawn, blackboard coordination, resource
//! claims, and structured result aggregation (spec §4.11, C11).

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::warn;

use crate::blackboard::Blackboard;
use crate::blackboard::FindingType;
use crate::budget::BudgetTracker;
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
use crate::protocol::AgentId;
use crate::protocol::TaskId;

const WRITE_TOOLS: &[&str] = &["write_file", "edit_file"];
const DISCOVERY_TOOLS: &[&str] = &["grep", "search_code", "search_files", "glob"];

fn is_write_class(tool: &str) -> bool {
    WRITE_TOOLS.contains(&tool)
}

fn is_discovery_class(tool: &str) -> bool {
    DISCOVERY_TOOLS.contains(&tool)
}

/// Extracts a call's target path from `path`, `file_path`, or the tool name
/// itself as a last resort (spec §4.7's extraction rule, reused here as the
/// claim key).
fn extract_path(tool: &str, args: &Value) -> String {
    if let Some(obj) = args.as_object() {
        for key in ["path", "file_path"] {
            if let Some(Value::String(s)) = obj.get(key) {
                return s.clone();
            }
        }
    }
    tool.to_string()
}

/// Describes one spawn request: the child's model/name, the task it serves,
/// its own budget, and which blackboard topics it should watch.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub task_id: Option<TaskId>,
    pub description: String,
    pub name: String,
    pub model: String,
    pub timeout: Duration,
    pub budget: ExecutionBudget,
    pub topic_patterns: Vec<String>,
}

/// The outcome of one subagent run (spec §4.11 step 6).
#[derive(Debug, Clone)]
pub struct SubagentResult {
    pub success: bool,
    pub message: String,
    pub session_id: AgentId,
    pub iterations: u64,
    pub usage: ExecutionUsage,
    pub execution_time: Duration,
    pub findings: Option<Vec<String>>,
    pub files_modified: Option<Vec<String>>,
    pub error: Option<String>,
}

/// Spawns subagents under a semaphore, wiring each one to the shared
/// blackboard and its own budget tracker (spec §4.11).
pub struct SubagentSpawner {
    semaphore: Arc<Semaphore>,
    blackboard: Option<Blackboard>,
    llm: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolRegistry>,
    pricing: PricingFn,
    agent_ids: AtomicCounter,
}

impl SubagentSpawner {
    pub fn new(max_concurrent: usize, llm: Arc<dyn LlmProvider>, tools: Arc<dyn ToolRegistry>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            blackboard: None,
            llm,
            tools,
            pricing: default_pricing_fn(),
            agent_ids: AtomicCounter::new(),
        }
    }

    pub fn with_blackboard(mut self, blackboard: Blackboard) -> Self {
        self.blackboard = Some(blackboard);
        self
    }

    pub fn with_pricing(mut self, pricing: PricingFn) -> Self {
        self.pricing = pricing;
        self
    }

    /// Runs one subagent to completion (spec §4.11 steps 1-7). Never
    /// panics on blackboard/claim failures; those are logged and
    /// swallowed so they never mask the run's actual result.
    pub async fn spawn(&self, request: SpawnRequest) -> SubagentResult {
        let started_at = Instant::now();
        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return SubagentResult {
                    success: false,
                    message: String::new(),
                    session_id: AgentId::from_counter(&self.agent_ids),
                    iterations: 0,
                    usage: ExecutionUsage::default(),
                    execution_time: started_at.elapsed(),
                    findings: None,
                    files_modified: None,
                    error: Some("subagent semaphore closed".to_string()),
                };
            }
        };

        let session_id = AgentId::from_counter(&self.agent_ids);
        let message_ids = Arc::new(AtomicCounter::new());
        let tracker = BudgetTracker::new(request.budget, self.pricing.clone());

        let injected: Arc<Mutex<Vec<Message>>> = Arc::new(Mutex::new(Vec::new()));
        let subscriptions: Vec<_> = match &self.blackboard {
            Some(board) => {
                board.post(
                    session_id.clone(),
                    "progress",
                    format!("Started task ({}): {}", request.name, request.description),
                    FindingType::Progress,
                    1.0,
                    None,
                );
                let mut handles = Vec::new();
                for pattern in &request.topic_patterns {
                    let injected = Arc::clone(&injected);
                    let message_ids = Arc::clone(&message_ids);
                    handles.push(board.subscribe(pattern.clone(), move |finding| {
                        injected.lock().expect("injected context lock poisoned").push(Message {
                            id: crate::protocol::MessageId::from_counter(&message_ids),
                            role: Role::System,
                            content: format!("[blackboard:{}] {}", finding.topic, finding.content),
                            tool_calls: None,
                            tool_call_id: None,
                            timestamp: finding.timestamp,
                        });
                    }));
                }
                handles
            }
            None => Vec::new(),
        };

        let mut messages: Vec<Message> = Vec::new();
        if let Some(board) = &self.blackboard {
            for finding in board.recent_context(5) {
                messages.push(Message {
                    id: crate::protocol::MessageId::from_counter(&message_ids),
                    role: Role::System,
                    content: format!("[blackboard:{}] {}", finding.topic, finding.content),
                    tool_calls: None,
                    tool_call_id: None,
                    timestamp: finding.timestamp,
                });
            }
        }
        messages.push(Message {
            id: crate::protocol::MessageId::from_counter(&message_ids),
            role: Role::User,
            content: request.description.clone(),
            tool_calls: None,
            tool_call_id: None,
            timestamp: chrono::Utc::now(),
        });

        let findings = Arc::new(Mutex::new(Vec::new()));
        let files_modified: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        let work = self.run_iterations(
            &request,
            session_id.clone(),
            &tracker,
            &message_ids,
            &mut messages,
            &injected,
            &findings,
            &files_modified,
        );

        let outcome = tokio::select! {
            result = work => result,
            _ = tokio::time::sleep(request.timeout) => {
                Err("Timeout: subagent exceeded its deadline".to_string())
            }
        };

        if let Some(board) = &self.blackboard {
            match &outcome {
                Ok(_) => {
                    board.post(
                        session_id.clone(),
                        "progress",
                        format!("Completed task: {}", request.description),
                        FindingType::Progress,
                        1.0,
                        None,
                    );
                }
                Err(reason) => {
                    board.post(
                        session_id.clone(),
                        "blocker",
                        reason.clone(),
                        FindingType::Blocker,
                        1.0,
                        None,
                    );
                }
            }
        }
        for handle in subscriptions {
            handle.unsubscribe();
        }

        let usage = tracker.usage();
        let collected_findings = {
            let guard = findings.lock().expect("findings lock poisoned");
            if guard.is_empty() { None } else { Some(guard.clone()) }
        };
        let modified = {
            let guard = files_modified.lock().expect("files_modified lock poisoned");
            if guard.is_empty() {
                None
            } else {
                Some(guard.iter().cloned().collect())
            }
        };

        match outcome {
            Ok(content) => SubagentResult {
                success: true,
                message: content,
                session_id,
                iterations: usage.iterations,
                usage,
                execution_time: started_at.elapsed(),
                findings: collected_findings,
                files_modified: modified,
                error: None,
            },
            Err(reason) => SubagentResult {
                success: false,
                message: String::new(),
                session_id,
                iterations: usage.iterations,
                usage,
                execution_time: started_at.elapsed(),
                findings: collected_findings,
                files_modified: modified,
                error: Some(reason),
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_iterations(
        &self,
        request: &SpawnRequest,
        session_id: AgentId,
        tracker: &BudgetTracker,
        message_ids: &AtomicCounter,
        messages: &mut Vec<Message>,
        injected: &Arc<Mutex<Vec<Message>>>,
        findings: &Arc<Mutex<Vec<String>>>,
        files_modified: &Arc<Mutex<HashSet<String>>>,
    ) -> Result<String, String> {
        loop {
            {
                let mut pending = injected.lock().expect("injected context lock poisoned");
                messages.append(&mut pending);
            }

            let options = ChatOptions {
                tools: self.tools.schemas(),
                model: Some(request.model.clone()),
            };
            let response = self
                .llm
                .chat_with_tools(messages, &options)
                .await
                .map_err(|err| format!("LLM call failed: {err}"))?;

            tracker.record_llm(response.usage.input, response.usage.output, Some(&request.model), response.cost);

            let tool_calls = match response.tool_calls {
                Some(calls) if !calls.is_empty() => calls,
                _ => return Ok(response.content),
            };

            messages.push(Message {
                id: crate::protocol::MessageId::from_counter(message_ids),
                role: Role::Assistant,
                content: response.content,
                tool_calls: Some(tool_calls.clone()),
                tool_call_id: None,
                timestamp: chrono::Utc::now(),
            });

            for call in &tool_calls {
                let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
                let resource = extract_path(&call.function.name, &args);

                let outcome = if is_write_class(&call.function.name) {
                    match &self.blackboard {
                        Some(board) if !board.claim(resource.clone(), session_id.clone()) => {
                            crate::llm::ToolOutcome {
                                success: false,
                                output: format!("Resource conflict: {resource} is claimed by another agent"),
                            }
                        }
                        _ => {
                            let result = self.tools.execute(&call.function.name, &args).await;
                            if let Some(board) = &self.blackboard {
                                board.release(&resource, &session_id);
                            }
                            if result.success {
                                files_modified.lock().expect("files_modified lock poisoned").insert(resource.clone());
                            }
                            result
                        }
                    }
                } else {
                    self.tools.execute(&call.function.name, &args).await
                };

                if is_discovery_class(&call.function.name) {
                    if let Some(board) = &self.blackboard {
                        let snippet: String = outcome.output.chars().take(500).collect();
                        let finding_id = board.post(
                            session_id.clone(),
                            "discovery",
                            snippet,
                            FindingType::Discovery,
                            0.8,
                            None,
                        );
                        findings.lock().expect("findings lock poisoned").push(finding_id.to_string());
                    }
                }

                tracker.record_tool(&call.function.name, &call.function.arguments, outcome.success);

                messages.push(Message {
                    id: crate::protocol::MessageId::from_counter(message_ids),
                    role: Role::Tool,
                    content: outcome.output,
                    tool_calls: None,
                    tool_call_id: Some(call.id.clone()),
                    timestamp: chrono::Utc::now(),
                });
            }

            let check = tracker.check_budget();
            if !check.can_continue {
                let reason = check
                    .stop_reason
                    .map(|r| format!("{r:?}"))
                    .unwrap_or_else(|| "budget exhausted".to_string());
                return Err(reason);
            }
            if tracker.usage().iterations >= request.budget.max_iterations {
                return Err("iterations exhausted".to_string());
            }
        }
    }

    /// Runs many spawns concurrently, keyed by `task_id`. Requests without
    /// a `task_id` are logged and dropped, since the result map has no key
    /// to place them under.
    pub async fn run_parallel(&self, requests: Vec<SpawnRequest>) -> HashMap<TaskId, SubagentResult> {
        let (with_task, without_task): (Vec<_>, Vec<_>) =
            requests.into_iter().partition(|r| r.task_id.is_some());
        for orphan in &without_task {
            warn!(description = %orphan.description, "dropping run_parallel request with no task_id");
        }

        let futures = with_task.into_iter().map(|request| async move {
            let task_id = request.task_id.clone().expect("partitioned above");
            let result = self.spawn(request).await;
            (task_id, result)
        });

        join_all(futures).await.into_iter().collect()
    }
}

#[cfg(test)]
#[path = "subagent.test.rs"]
mod tests;
