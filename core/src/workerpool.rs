//! Slot-based sub-agent dispatch (spec §4.10, C10).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use agent_error::ErrorExt;
use agent_error::Location;
use agent_error::StatusCode;
use agent_error::fmt_error_chain;
use futures::future::BoxFuture;
use snafu::Snafu;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ids::AtomicCounter;
use crate::protocol::AgentId;
use crate::protocol::TaskId;

#[derive(Snafu)]
#[snafu(visibility(pub(crate)), module)]
pub enum WorkerPoolError {
    #[snafu(display("worker pool has no free slot ({max_concurrency} in use)"))]
    NoFreeSlot {
        max_concurrency: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("no registered worker spec covers capabilities {required:?}"))]
    NoMatchingSpec {
        required: Vec<String>,
        #[snafu(implicit)]
        location: Location,
    },
}

impl std::fmt::Debug for WorkerPoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_error_chain(self, f)
    }
}

impl ErrorExt for WorkerPoolError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NoFreeSlot { .. } => StatusCode::ResourcesExhausted,
            Self::NoMatchingSpec { .. } => StatusCode::InvalidArguments,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub type Result<T> = std::result::Result<T, WorkerPoolError>;

/// A static description of a sub-agent variant: model, capabilities, and
/// limits (spec GLOSSARY: "Worker spec").
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub name: String,
    pub model: String,
    pub capabilities: Vec<String>,
    pub timeout: Duration,
    /// Relative cost profile; lower is cheaper. Used to break ties between
    /// specs that equally satisfy a capability requirement.
    pub cost_tier: u32,
}

/// Picks the cheapest spec whose capabilities are a superset of
/// `required_capabilities`. Ties break on declaration order.
pub fn select_worker<'a>(specs: &'a [WorkerSpec], required_capabilities: &[String]) -> Option<&'a WorkerSpec> {
    specs
        .iter()
        .filter(|spec| required_capabilities.iter().all(|cap| spec.capabilities.contains(cap)))
        .min_by_key(|spec| spec.cost_tier)
}

/// The result of one completed dispatch.
#[derive(Debug, Clone)]
pub struct CompletedWorker {
    pub agent_id: AgentId,
    pub task_id: Option<TaskId>,
    pub success: bool,
    pub output: String,
}

struct Inflight {
    task_id: Option<TaskId>,
    description: String,
    model: String,
    name: String,
    started_at: Instant,
    cancel: CancellationToken,
}

/// Queryable snapshot of one dispatched worker.
#[derive(Debug, Clone)]
pub struct InflightStatus {
    pub task_id: Option<TaskId>,
    pub description: String,
    pub model: String,
    pub name: String,
    pub elapsed: Duration,
}

struct State {
    inflight: HashMap<AgentId, Inflight>,
}

/// A work unit dispatched into the pool: the chosen spec and the future
/// that performs the sub-agent's execution.
pub type DispatchFuture = BoxFuture<'static, (bool, String)>;

/// Slot-based concurrency controller over sub-agent dispatch (spec §4.10).
pub struct WorkerPool {
    max_concurrency: usize,
    state: Mutex<State>,
    agent_ids: AtomicCounter,
    completions_tx: mpsc::UnboundedSender<CompletedWorker>,
    completions_rx: Mutex<mpsc::UnboundedReceiver<CompletedWorker>>,
    specs: Vec<WorkerSpec>,
}

impl WorkerPool {
    pub fn new(max_concurrency: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            max_concurrency,
            state: Mutex::new(State { inflight: HashMap::new() }),
            agent_ids: AtomicCounter::new(),
            completions_tx: tx,
            completions_rx: Mutex::new(rx),
            specs: Vec::new(),
        }
    }

    /// Registers the candidate specs `dispatch_selected` chooses from.
    pub fn with_specs(mut self, specs: Vec<WorkerSpec>) -> Self {
        self.specs = specs;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("worker pool lock poisoned")
    }

    pub fn inflight_count(&self) -> usize {
        self.lock().inflight.len()
    }

    /// Dispatches `make_future(spec)` against a timeout race. Fails if no
    /// slot is free; the orchestrator is expected to `wait_for_any` first.
    pub fn dispatch(
        &self,
        spec: WorkerSpec,
        task_id: Option<TaskId>,
        description: impl Into<String>,
        make_future: impl FnOnce(CancellationToken) -> DispatchFuture,
    ) -> Result<AgentId> {
        let mut state = self.lock();
        if state.inflight.len() >= self.max_concurrency {
            return worker_pool_error::NoFreeSlotSnafu {
                max_concurrency: self.max_concurrency,
            }
            .fail();
        }

        let agent_id = AgentId::from_counter(&self.agent_ids);
        let cancel = CancellationToken::new();
        let timeout = spec.timeout;
        let work = make_future(cancel.clone());
        let tx = self.completions_tx.clone();
        let agent_id_task = agent_id.clone();
        let task_id_task = task_id.clone();

        tokio::spawn(async move {
            let (success, output) = tokio::select! {
                result = work => result,
                _ = tokio::time::sleep(timeout) => (false, "Timeout: worker exceeded its deadline".to_string()),
            };
            let _ = tx.send(CompletedWorker {
                agent_id: agent_id_task,
                task_id: task_id_task,
                success,
                output,
            });
        });

        state.inflight.insert(
            agent_id.clone(),
            Inflight {
                task_id,
                description: description.into(),
                model: spec.model,
                name: spec.name,
                started_at: Instant::now(),
                cancel,
            },
        );
        Ok(agent_id)
    }

    /// Chooses a worker spec by capability match and cost profile from the
    /// specs registered via [`WorkerPool::with_specs`], then dispatches it.
    pub fn dispatch_selected(
        &self,
        required_capabilities: &[String],
        task_id: Option<TaskId>,
        description: impl Into<String>,
        make_future: impl FnOnce(CancellationToken) -> DispatchFuture,
    ) -> Result<AgentId> {
        let spec = select_worker(&self.specs, required_capabilities)
            .cloned()
            .ok_or_else(|| {
                worker_pool_error::NoMatchingSpecSnafu {
                    required: required_capabilities.to_vec(),
                }
                .build()
            })?;
        self.dispatch(spec, task_id, description, make_future)
    }

    /// Resolves for whichever dispatched worker finishes first. Never
    /// rejects: a panicking or cancelled worker still surfaces as a failed
    /// result.
    pub async fn wait_for_any(&self) -> Option<CompletedWorker> {
        let completed = {
            let mut rx = self.completions_rx.lock().expect("worker pool lock poisoned");
            rx.recv().await
        }?;
        self.lock().inflight.remove(&completed.agent_id);
        Some(completed)
    }

    /// Drains by repeatedly calling `wait_for_any` until no workers remain.
    pub async fn wait_for_all(&self) -> Vec<CompletedWorker> {
        let mut results = Vec::new();
        while self.inflight_count() > 0 {
            match self.wait_for_any().await {
                Some(result) => results.push(result),
                None => break,
            }
        }
        results
    }

    /// Grants a brief grace window, then unregisters every worker
    /// regardless of whether it had already finished.
    pub async fn cancel_all(&self) {
        let tokens: Vec<CancellationToken> = {
            let state = self.lock();
            state.inflight.values().map(|w| w.cancel.clone()).collect()
        };
        for token in &tokens {
            token.cancel();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.lock().inflight.clear();
    }

    pub fn status(&self) -> Vec<InflightStatus> {
        self.lock()
            .inflight
            .values()
            .map(|w| InflightStatus {
                task_id: w.task_id.clone(),
                description: w.description.clone(),
                model: w.model.clone(),
                name: w.name.clone(),
                elapsed: w.started_at.elapsed(),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "workerpool.test.rs"]
mod tests;
