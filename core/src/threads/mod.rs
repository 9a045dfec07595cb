//! Thread manager: fork/merge/rollback over conversation history, with a
//! JSON export format (spec §4.9, C9).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use agent_error::ErrorExt;
use agent_error::Location;
use agent_error::StatusCode;
use agent_error::fmt_error_chain;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use snafu::Snafu;

use crate::ids::AtomicCounter;
use crate::llm::Message;
use crate::llm::Role;
use crate::protocol::MessageId;
use crate::protocol::ThreadId;

#[derive(Snafu)]
#[snafu(visibility(pub(crate)), module)]
pub enum ThreadError {
    #[snafu(display("thread {thread_id} not found"))]
    NotFound {
        thread_id: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("thread {thread_id} has no fork point"))]
    NoForkPoint {
        thread_id: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("message {message_id} not found in thread {thread_id}"))]
    MessageNotFound {
        thread_id: String,
        message_id: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("cannot merge into nonexistent main thread {thread_id}"))]
    NoSuchMain {
        thread_id: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("thread {thread_id} is {status:?} and cannot be made active"))]
    NotActive {
        thread_id: String,
        status: ThreadStatus,
        #[snafu(implicit)]
        location: Location,
    },
}

impl std::fmt::Debug for ThreadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_error_chain(self, f)
    }
}

impl ErrorExt for ThreadError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::MessageNotFound { .. } => StatusCode::InvalidArguments,
            Self::NoForkPoint { .. } | Self::NoSuchMain { .. } | Self::NotActive { .. } => StatusCode::InvariantViolation,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub type Result<T> = std::result::Result<T, ThreadError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Active,
    Merged,
    Abandoned,
    Archived,
}

impl ThreadStatus {
    /// Whether a thread in this state is eligible to become the active
    /// thread (spec.md: "a merged/abandoned/archived thread cannot be
    /// selected as active").
    pub fn is_living(&self) -> bool {
        matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub parent_id: Option<ThreadId>,
    pub fork_point_id: Option<MessageId>,
    pub messages: Vec<Message>,
    pub status: ThreadStatus,
    pub created_at: chrono::DateTime<Utc>,
}

/// How [`ThreadManager::merge`] reconciles a branch's post-divergence
/// messages into main (spec §4.9).
pub enum MergeStrategy {
    Append,
    Interleave,
    Replace,
    Summarize,
    /// Delegates to a caller-supplied resolver given `(main_tail, branch_tail)`.
    Custom(Arc<dyn Fn(&[Message], &[Message]) -> Vec<Message> + Send + Sync>),
}

impl std::fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Append => write!(f, "Append"),
            Self::Interleave => write!(f, "Interleave"),
            Self::Replace => write!(f, "Replace"),
            Self::Summarize => write!(f, "Summarize"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Export format: `{ active_thread_id, threads: [[id, Thread], ...] }`
/// (spec §6).
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadsExport {
    pub active_thread_id: Option<ThreadId>,
    pub threads: Vec<(ThreadId, Thread)>,
}

struct State {
    threads: HashMap<ThreadId, Thread>,
    active_thread_id: Option<ThreadId>,
}

/// Owns every thread for one UI session. The active thread is
/// single-writer; concurrent writers must synchronize externally (spec §5).
pub struct ThreadManager {
    state: Mutex<State>,
    thread_ids: AtomicCounter,
    message_ids: AtomicCounter,
}

impl ThreadManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                threads: HashMap::new(),
                active_thread_id: None,
            }),
            thread_ids: AtomicCounter::new(),
            message_ids: AtomicCounter::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("thread manager lock poisoned")
    }

    pub fn create_thread(&self) -> ThreadId {
        let mut state = self.lock();
        let id = ThreadId::from_counter(&self.thread_ids);
        state.threads.insert(
            id.clone(),
            Thread {
                id: id.clone(),
                parent_id: None,
                fork_point_id: None,
                messages: Vec::new(),
                status: ThreadStatus::Active,
                created_at: Utc::now(),
            },
        );
        state.active_thread_id = Some(id.clone());
        id
    }

    /// Switches the active thread to `id`. Rejects any thread whose status
    /// is not `active` (spec.md: "a merged/abandoned/archived thread cannot
    /// be selected as active").
    pub fn switch_thread(&self, id: &ThreadId) -> Result<()> {
        let mut state = self.lock();
        let thread = state
            .threads
            .get(id)
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: id.to_string() }.build())?;
        if !thread.status.is_living() {
            return thread_error::NotActiveSnafu {
                thread_id: id.to_string(),
                status: thread.status,
            }
            .fail();
        }
        state.active_thread_id = Some(id.clone());
        Ok(())
    }

    /// Marks `id` as abandoned: it keeps its history but can no longer be
    /// selected as active or merged from.
    pub fn abandon(&self, id: &ThreadId) -> Result<()> {
        let mut state = self.lock();
        let thread = state
            .threads
            .get_mut(id)
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: id.to_string() }.build())?;
        thread.status = ThreadStatus::Abandoned;
        if state.active_thread_id.as_ref() == Some(id) {
            state.active_thread_id = None;
        }
        Ok(())
    }

    /// Marks `id` as archived: a terminal, read-only state for threads kept
    /// for record-keeping after the work they represent has concluded.
    pub fn archive(&self, id: &ThreadId) -> Result<()> {
        let mut state = self.lock();
        let thread = state
            .threads
            .get_mut(id)
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: id.to_string() }.build())?;
        thread.status = ThreadStatus::Archived;
        if state.active_thread_id.as_ref() == Some(id) {
            state.active_thread_id = None;
        }
        Ok(())
    }

    pub fn active_thread_id(&self) -> Option<ThreadId> {
        self.lock().active_thread_id.clone()
    }

    pub fn get(&self, id: &ThreadId) -> Option<Thread> {
        self.lock().threads.get(id).cloned()
    }

    pub fn add_message(&self, role: Role, content: impl Into<String>) -> Result<MessageId> {
        let mut state = self.lock();
        let active = state
            .active_thread_id
            .clone()
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: "<none active>".to_string() }.build())?;
        let message_id = MessageId::from_counter(&self.message_ids);
        let thread = state
            .threads
            .get_mut(&active)
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: active.to_string() }.build())?;
        thread.messages.push(Message {
            id: message_id.clone(),
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            timestamp: Utc::now(),
        });
        Ok(message_id)
    }

    /// Forks the active thread at `at` (defaulting to its last message),
    /// copying messages up to and including the fork point. The new thread
    /// becomes active.
    pub fn fork(&self, at: Option<MessageId>) -> Result<ThreadId> {
        let mut state = self.lock();
        let parent_id = state
            .active_thread_id
            .clone()
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: "<none active>".to_string() }.build())?;
        let parent = state
            .threads
            .get(&parent_id)
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: parent_id.to_string() }.build())?
            .clone();

        let fork_point_id = match at {
            Some(id) => id,
            None => parent
                .messages
                .last()
                .map(|m| m.id.clone())
                .ok_or_else(|| thread_error::NoForkPointSnafu { thread_id: parent_id.to_string() }.build())?,
        };
        let cut = parent
            .messages
            .iter()
            .position(|m| m.id == fork_point_id)
            .ok_or_else(|| thread_error::MessageNotFoundSnafu {
                thread_id: parent_id.to_string(),
                message_id: fork_point_id.to_string(),
            }
            .build())?;

        let child_id = ThreadId::from_counter(&self.thread_ids);
        state.threads.insert(
            child_id.clone(),
            Thread {
                id: child_id.clone(),
                parent_id: Some(parent_id),
                fork_point_id: Some(fork_point_id),
                messages: parent.messages[..=cut].to_vec(),
                status: ThreadStatus::Active,
                created_at: Utc::now(),
            },
        );
        state.active_thread_id = Some(child_id.clone());
        Ok(child_id)
    }

    /// Merges `branch`'s post-divergence messages into `main` (defaulting
    /// to `branch.parent_id`) using `strategy`. Unless `keep_source` is
    /// set, `branch` transitions to `merged` and `main` becomes active.
    pub fn merge(&self, branch: &ThreadId, main: Option<&ThreadId>, strategy: MergeStrategy, keep_source: bool) -> Result<()> {
        let mut state = self.lock();
        let branch_thread = state
            .threads
            .get(branch)
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: branch.to_string() }.build())?
            .clone();

        let main_id = main
            .cloned()
            .or_else(|| branch_thread.parent_id.clone())
            .ok_or_else(|| thread_error::NoSuchMainSnafu { thread_id: branch.to_string() }.build())?;
        let main_thread = state
            .threads
            .get(&main_id)
            .ok_or_else(|| thread_error::NoSuchMainSnafu { thread_id: main_id.to_string() }.build())?
            .clone();

        let divergence = branch_thread.fork_point_id.as_ref().and_then(|fp| {
            main_thread.messages.iter().position(|m| m.id == *fp).map(|idx| idx + 1)
        });
        let main_tail: &[Message] = divergence.map(|idx| &main_thread.messages[idx..]).unwrap_or(&[]);
        let branch_cut = branch_thread
            .fork_point_id
            .as_ref()
            .and_then(|fp| branch_thread.messages.iter().position(|m| m.id == *fp))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        let branch_tail = &branch_thread.messages[branch_cut.min(branch_thread.messages.len())..];

        let merged_tail = match strategy {
            MergeStrategy::Append => {
                let mut tail = main_tail.to_vec();
                tail.extend(branch_tail.iter().cloned());
                tail
            }
            MergeStrategy::Interleave => {
                let mut tail: Vec<Message> = main_tail.iter().chain(branch_tail.iter()).cloned().collect();
                tail.sort_by_key(|m| m.timestamp);
                tail
            }
            MergeStrategy::Replace => branch_tail.to_vec(),
            MergeStrategy::Summarize => {
                let summary = branch_tail
                    .iter()
                    .map(|m| m.content.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                vec![Message {
                    id: MessageId::from_counter(&self.message_ids),
                    role: Role::Assistant,
                    content: format!("Summary of branch {branch}: {summary}"),
                    tool_calls: None,
                    tool_call_id: None,
                    timestamp: Utc::now(),
                }]
            }
            MergeStrategy::Custom(resolver) => resolver(main_tail, branch_tail),
        };

        let divergence_start = divergence.unwrap_or(main_thread.messages.len());
        let main_thread_mut = state.threads.get_mut(&main_id).expect("checked above");
        main_thread_mut.messages.truncate(divergence_start);
        main_thread_mut.messages.extend(merged_tail);

        if !keep_source {
            let branch_mut = state.threads.get_mut(branch).expect("checked above");
            branch_mut.status = ThreadStatus::Merged;
            state.active_thread_id = Some(main_id);
        }
        Ok(())
    }

    pub fn rollback_to_message(&self, id: &MessageId) -> Result<()> {
        let mut state = self.lock();
        let active = state
            .active_thread_id
            .clone()
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: "<none active>".to_string() }.build())?;
        let thread = state
            .threads
            .get_mut(&active)
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: active.to_string() }.build())?;
        let cut = thread
            .messages
            .iter()
            .position(|m| m.id == *id)
            .ok_or_else(|| thread_error::MessageNotFoundSnafu {
                thread_id: active.to_string(),
                message_id: id.to_string(),
            }
            .build())?;
        thread.messages.truncate(cut + 1);
        Ok(())
    }

    pub fn rollback_by(&self, n: usize) -> Result<()> {
        let mut state = self.lock();
        let active = state
            .active_thread_id
            .clone()
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: "<none active>".to_string() }.build())?;
        let thread = state
            .threads
            .get_mut(&active)
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: active.to_string() }.build())?;
        let new_len = thread.messages.len().saturating_sub(n);
        thread.messages.truncate(new_len);
        Ok(())
    }

    pub fn rollback_to_fork_point(&self) -> Result<()> {
        let mut state = self.lock();
        let active = state
            .active_thread_id
            .clone()
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: "<none active>".to_string() }.build())?;
        let thread = state
            .threads
            .get_mut(&active)
            .ok_or_else(|| thread_error::NotFoundSnafu { thread_id: active.to_string() }.build())?;
        let fork_point = thread
            .fork_point_id
            .clone()
            .ok_or_else(|| thread_error::NoForkPointSnafu { thread_id: active.to_string() }.build())?;
        let cut = thread
            .messages
            .iter()
            .position(|m| m.id == fork_point)
            .ok_or_else(|| thread_error::MessageNotFoundSnafu {
                thread_id: active.to_string(),
                message_id: fork_point.to_string(),
            }
            .build())?;
        thread.messages.truncate(cut + 1);
        Ok(())
    }

    pub fn delete_thread(&self, id: &ThreadId) -> Result<()> {
        let mut state = self.lock();
        if state.threads.remove(id).is_none() {
            return thread_error::NotFoundSnafu { thread_id: id.to_string() }.fail();
        }
        if state.active_thread_id.as_ref() == Some(id) {
            state.active_thread_id = None;
        }
        Ok(())
    }

    pub fn export(&self) -> ThreadsExport {
        let state = self.lock();
        ThreadsExport {
            active_thread_id: state.active_thread_id.clone(),
            threads: state.threads.iter().map(|(id, t)| (id.clone(), t.clone())).collect(),
        }
    }

    pub fn import(&self, export: ThreadsExport) {
        let mut state = self.lock();
        state.threads = export.threads.into_iter().collect();
        state.active_thread_id = export.active_thread_id;
    }
}

impl Default for ThreadManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "mod.test.rs"]
mod tests;
