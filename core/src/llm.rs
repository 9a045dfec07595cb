//! External collaborator interfaces: the LLM provider and the tool
//! registry (spec §6).

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::protocol::MessageId;

/// A chat message, OpenAI-style. The same type doubles as conversation
/// history for the thread manager (spec §4.9) and as LLM provider input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Token usage reported by one model call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
    pub cached: Option<u64>,
}

/// Options passed to `chat_with_tools`: the tool schemas on offer and any
/// provider-specific knobs.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub tools: Vec<ToolSchema>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One model turn's result.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    pub usage: Usage,
    pub stop_reason: String,
    pub cost: Option<f64>,
}

/// The injected LLM provider collaborator (spec §6). Implementations wrap
/// a concrete API (OpenRouter, OpenAI, Anthropic); no inheritance
/// hierarchy is required, only this one polymorphic interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat_with_tools(&self, messages: &[Message], options: &ChatOptions) -> anyhow::Result<ChatResponse>;
}

/// The outcome of one tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub success: bool,
    pub output: String,
}

/// The injected tool registry collaborator (spec §6).
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn execute(&self, name: &str, args: &Value) -> ToolOutcome;
    fn schemas(&self) -> Vec<ToolSchema>;
}
