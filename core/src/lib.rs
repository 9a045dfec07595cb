//! Core runtime for the agent: submission/event queues, budget tracking,
//! the tool-call scheduler, task and thread managers, the subagent
//! spawner, and the outer agent loop that ties them together.

pub mod agentloop;
pub mod blackboard;
pub mod bridge;
pub mod budget;
pub mod config;
pub mod ids;
pub mod llm;
pub mod pricing;
pub mod protocol;
pub mod queue;
pub mod scheduler;
pub mod subagent;
pub mod tasks;
pub mod threads;
pub mod workerpool;

pub use agentloop::AgentLoop;
pub use agentloop::AgentLoopBuilder;
pub use agentloop::AgentLoopError;
pub use agentloop::LoopOutcome;
pub use agentloop::RunRequest;
pub use agentloop::RunResult;
pub use blackboard::Blackboard;
pub use blackboard::Finding;
pub use blackboard::FindingType;
pub use bridge::BridgeError;
pub use bridge::ProtocolBridge;
pub use budget::BudgetAxis;
pub use budget::BudgetCheckResult;
pub use budget::BudgetTracker;
pub use budget::StopReason;
pub use budget::Suggestion;
pub use config::ExecutionBudget;
pub use config::ExecutionUsage;
pub use config::StuckHeuristics;
pub use ids::AtomicCounter;
pub use llm::LlmProvider;
pub use llm::Message;
pub use llm::ToolRegistry;
pub use pricing::PricingFn;
pub use pricing::default_pricing_fn;
pub use protocol::AgentEvent;
pub use protocol::AgentId;
pub use protocol::EventEnvelope;
pub use protocol::SubmissionId;
pub use protocol::TaskId;
pub use protocol::ThreadId;
pub use queue::EventQueue;
pub use queue::SubmissionQueue;
pub use queue::SubmissionQueueConfig;
pub use scheduler::ToolCall;
pub use scheduler::schedule;
pub use subagent::SpawnRequest;
pub use subagent::SubagentResult;
pub use subagent::SubagentSpawner;
pub use tasks::Task;
pub use tasks::TaskManager;
pub use tasks::TaskStatus;
pub use threads::MergeStrategy;
pub use threads::Thread;
pub use threads::ThreadManager;
pub use workerpool::WorkerPool;
pub use workerpool::WorkerSpec;
