//! Shared data model (spec §3): IDs, submissions, and events.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

macro_rules! newtype_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn from_counter(counter: &crate::ids::AtomicCounter) -> Self {
                Self(counter.next_id($prefix))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_id!(SubmissionId, "sub");
newtype_id!(EventId, "evt");
newtype_id!(TaskId, "task");
newtype_id!(ThreadId, "thread");
newtype_id!(MessageId, "msg");
newtype_id!(AgentId, "agent");
newtype_id!(FindingId, "finding");

/// A single user or system operation queued for execution (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    UserTurn { content: String },
    Cancel { target: SubmissionId },
    Interrupt,
}

/// An operation entering the submission queue, assigned an ID at enqueue
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub op: Operation,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub correlation_id: Option<SubmissionId>,
}

/// Events emitted by the agent loop and its collaborators, correlated back
/// to the submission that caused them (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    AgentMessage {
        content: String,
        done: bool,
    },
    ToolStarted {
        call_id: String,
        name: String,
    },
    ToolFinished {
        call_id: String,
        name: String,
        success: bool,
    },
    BudgetWarning {
        message: String,
    },
    Error {
        code: String,
        message: String,
        recoverable: bool,
        stack: Option<String>,
    },
    SubagentSpawned {
        agent_id: AgentId,
        task_id: Option<TaskId>,
    },
    SubagentCompleted {
        agent_id: AgentId,
        success: bool,
    },
    TaskRecovered {
        task_id: TaskId,
        reason: String,
    },
    DoomLoopDetected {
        scope: DoomLoopScope,
        fingerprint: String,
    },
}

/// The discriminant of an [`AgentEvent`], used by `subscribe_typed` (spec
/// §4.3) to filter a listener to one variant without cloning the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    AgentMessage,
    ToolStarted,
    ToolFinished,
    BudgetWarning,
    Error,
    SubagentSpawned,
    SubagentCompleted,
    TaskRecovered,
    DoomLoopDetected,
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::AgentMessage { .. } => EventKind::AgentMessage,
            Self::ToolStarted { .. } => EventKind::ToolStarted,
            Self::ToolFinished { .. } => EventKind::ToolFinished,
            Self::BudgetWarning { .. } => EventKind::BudgetWarning,
            Self::Error { .. } => EventKind::Error,
            Self::SubagentSpawned { .. } => EventKind::SubagentSpawned,
            Self::SubagentCompleted { .. } => EventKind::SubagentCompleted,
            Self::TaskRecovered { .. } => EventKind::TaskRecovered,
            Self::DoomLoopDetected { .. } => EventKind::DoomLoopDetected,
        }
    }
}

/// Scope of a detected doom loop, matching `LoopDetected{scope}` in spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoomLoopScope {
    Local,
    Global,
}

/// An envelope wrapping an [`AgentEvent`] with routing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub submission_id: Option<SubmissionId>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event: AgentEvent,
}

#[cfg(test)]
#[path = "protocol.test.rs"]
mod tests;
