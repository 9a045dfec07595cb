//! Task manager: a dependency DAG with heartbeat-refreshed leases and a
//! markdown export/import format (spec §4.8, C8).

mod markdown;

use std::collections::HashMap;
use std::sync::Mutex;

use agent_error::ErrorExt;
use agent_error::Location;
use agent_error::StatusCode;
use agent_error::fmt_error_chain;
use chrono::DateTime;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use snafu::Snafu;

use crate::protocol::TaskId;

pub use markdown::MarkdownError;

#[derive(Snafu)]
#[snafu(visibility(pub(crate)), module)]
pub enum TaskError {
    #[snafu(display("task {task_id} not found"))]
    NotFound {
        task_id: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("task {task_id} is owned by {actual_owner}, not {claimed_owner}"))]
    NotOwner {
        task_id: String,
        actual_owner: String,
        claimed_owner: String,
        #[snafu(implicit)]
        location: Location,
    },
}

impl std::fmt::Debug for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_error_chain(self, f)
    }
}

impl ErrorExt for TaskError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::InvalidArguments,
            Self::NotOwner { .. } => StatusCode::InvariantViolation,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    /// Soft-deleted: removed from the active worklist but kept in the DAG
    /// so other tasks' `blocked_by`/`blocks` edges and history stay intact.
    Deleted,
}

/// One node in the task DAG.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub index: u64,
    pub subject: String,
    pub description: String,
    pub status: TaskStatus,
    pub owner: Option<String>,
    pub lease_heartbeat: Option<DateTime<Utc>>,
    pub blocked_by: Vec<TaskId>,
    pub blocks: Vec<TaskId>,
    pub metadata: HashMap<String, String>,
}

impl Task {
    /// A task is available iff it is pending and every task that blocks it
    /// has completed.
    pub fn is_available(&self, tasks: &HashMap<TaskId, Task>) -> bool {
        self.status == TaskStatus::Pending
            && self.blocked_by.iter().all(|id| {
                tasks
                    .get(id)
                    .is_some_and(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Deleted))
            })
    }
}

struct State {
    tasks: HashMap<TaskId, Task>,
    next_index: u64,
}

/// Owns the task DAG and serializes every mutation behind a single lock;
/// reads return owned copies (spec §5 locking discipline).
pub struct TaskManager {
    state: Mutex<State>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                tasks: HashMap::new(),
                next_index: 1,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("task manager lock poisoned")
    }

    /// Creates a new pending task, wiring `blocked_by` bidirectionally.
    pub fn create(&self, subject: impl Into<String>, description: impl Into<String>, blocked_by: Vec<TaskId>) -> TaskId {
        let mut state = self.lock();
        let index = state.next_index;
        state.next_index += 1;
        let id = TaskId(format!("task-{index}"));

        for dep in &blocked_by {
            if let Some(dep_task) = state.tasks.get_mut(dep) {
                dep_task.blocks.push(id.clone());
            }
        }

        state.tasks.insert(
            id.clone(),
            Task {
                id: id.clone(),
                index,
                subject: subject.into(),
                description: description.into(),
                status: TaskStatus::Pending,
                owner: None,
                lease_heartbeat: None,
                blocked_by,
                blocks: Vec::new(),
                metadata: HashMap::new(),
            },
        );
        id
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.lock().tasks.get(id).cloned()
    }

    /// Returns every task ordered `in_progress → pending → completed`, ties
    /// broken by numeric task index.
    pub fn list(&self) -> Vec<Task> {
        let state = self.lock();
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| (status_rank(t.status), t.index));
        tasks
    }

    pub fn update_subject_description(&self, id: &TaskId, subject: Option<String>, description: Option<String>) -> Result<()> {
        let mut state = self.lock();
        let task = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| task_error::NotFoundSnafu { task_id: id.to_string() }.build())?;
        if let Some(subject) = subject {
            task.subject = subject;
        }
        if let Some(description) = description {
            task.description = description;
        }
        Ok(())
    }

    /// Claims a pending task for `owner`.
    pub fn claim(&self, id: &TaskId, owner: impl Into<String>) -> Result<()> {
        let mut state = self.lock();
        let task = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| task_error::NotFoundSnafu { task_id: id.to_string() }.build())?;
        task.status = TaskStatus::InProgress;
        task.owner = Some(owner.into());
        task.lease_heartbeat = Some(Utc::now());
        Ok(())
    }

    /// Refreshes the lease timestamp, but only if `owner` matches the
    /// current holder.
    pub fn heartbeat(&self, id: &TaskId, owner: &str) -> Result<()> {
        let mut state = self.lock();
        let task = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| task_error::NotFoundSnafu { task_id: id.to_string() }.build())?;
        match &task.owner {
            Some(actual) if actual == owner => {
                task.lease_heartbeat = Some(Utc::now());
                Ok(())
            }
            Some(actual) => task_error::NotOwnerSnafu {
                task_id: id.to_string(),
                actual_owner: actual.clone(),
                claimed_owner: owner.to_string(),
            }
            .fail(),
            None => task_error::NotOwnerSnafu {
                task_id: id.to_string(),
                actual_owner: "none".to_string(),
                claimed_owner: owner.to_string(),
            }
            .fail(),
        }
    }

    pub fn complete(&self, id: &TaskId) -> Result<()> {
        let mut state = self.lock();
        let task = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| task_error::NotFoundSnafu { task_id: id.to_string() }.build())?;
        task.status = TaskStatus::Completed;
        task.owner = None;
        task.lease_heartbeat = None;
        Ok(())
    }

    /// Soft-deletes `id`: the task stays in the DAG with `status: deleted`
    /// so other tasks' `blocked_by`/`blocks` edges and history survive.
    pub fn delete(&self, id: &TaskId) -> Result<()> {
        let mut state = self.lock();
        let task = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| task_error::NotFoundSnafu { task_id: id.to_string() }.build())?;
        task.status = TaskStatus::Deleted;
        task.owner = None;
        task.lease_heartbeat = None;
        Ok(())
    }

    /// Adds `blocker` as a dependency of `id`, maintaining both sides of the
    /// edge. A no-op if the edge already exists.
    pub fn add_dependency(&self, id: &TaskId, blocker: &TaskId) -> Result<()> {
        let mut state = self.lock();
        if !state.tasks.contains_key(id) {
            return task_error::NotFoundSnafu { task_id: id.to_string() }.fail();
        }
        if !state.tasks.contains_key(blocker) {
            return task_error::NotFoundSnafu { task_id: blocker.to_string() }.fail();
        }
        let task = state.tasks.get_mut(id).expect("checked above");
        if !task.blocked_by.contains(blocker) {
            task.blocked_by.push(blocker.clone());
        }
        let blocker_task = state.tasks.get_mut(blocker).expect("checked above");
        if !blocker_task.blocks.contains(id) {
            blocker_task.blocks.push(id.clone());
        }
        Ok(())
    }

    /// Removes `blocker` as a dependency of `id`, maintaining both sides of
    /// the edge. A no-op if the edge does not exist.
    pub fn remove_dependency(&self, id: &TaskId, blocker: &TaskId) -> Result<()> {
        let mut state = self.lock();
        if !state.tasks.contains_key(id) {
            return task_error::NotFoundSnafu { task_id: id.to_string() }.fail();
        }
        if !state.tasks.contains_key(blocker) {
            return task_error::NotFoundSnafu { task_id: blocker.to_string() }.fail();
        }
        let task = state.tasks.get_mut(id).expect("checked above");
        task.blocked_by.retain(|b| b != blocker);
        let blocker_task = state.tasks.get_mut(blocker).expect("checked above");
        blocker_task.blocks.retain(|b| b != id);
        Ok(())
    }

    /// Reverts in-progress tasks whose owner is no longer active and whose
    /// lease has gone stale. Returns the reclaimed task IDs so the caller
    /// can emit `task.recovered` events.
    pub fn reconcile_stale_in_progress(&self, stale_after_ms: i64, active_owners: &[String]) -> Vec<TaskId> {
        let mut state = self.lock();
        let now = Utc::now();
        let stale_after = ChronoDuration::milliseconds(stale_after_ms);
        let mut recovered = Vec::new();

        for task in state.tasks.values_mut() {
            if task.status != TaskStatus::InProgress {
                continue;
            }
            let owner_inactive = task
                .owner
                .as_ref()
                .map_or(true, |owner| !active_owners.contains(owner));
            let lease_stale = task
                .lease_heartbeat
                .map_or(true, |hb| now.signed_duration_since(hb) > stale_after);

            if owner_inactive && lease_stale {
                let reason = format!(
                    "owner {} inactive, lease stale past {}ms",
                    task.owner.as_deref().unwrap_or("<none>"),
                    stale_after_ms
                );
                task.status = TaskStatus::Pending;
                task.owner = None;
                task.lease_heartbeat = None;
                task.metadata.insert("recoveryReason".to_string(), reason);
                recovered.push(task.id.clone());
            }
        }
        recovered
    }

    pub fn to_markdown(&self) -> String {
        markdown::to_markdown(&self.list())
    }

    /// Replaces the entire DAG with the tasks parsed from `text`, resetting
    /// the ID allocator to one past the highest imported index.
    pub fn from_markdown(&self, text: &str) -> std::result::Result<(), MarkdownError> {
        let tasks = markdown::from_markdown(text)?;
        let mut state = self.lock();
        let next_index = tasks.iter().map(|t| t.index).max().unwrap_or(0) + 1;
        state.tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        state.next_index = next_index;
        Ok(())
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

fn status_rank(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::InProgress => 0,
        TaskStatus::Pending => 1,
        TaskStatus::Completed => 2,
        TaskStatus::Deleted => 3,
    }
}

#[cfg(test)]
#[path = "mod.test.rs"]
mod tests;
