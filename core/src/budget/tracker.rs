//! Per-agent budget accounting, progress detection, and budget checks
//! (spec §4.5, C5).

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::time::Instant;

use crate::budget::fingerprint;
use crate::budget::fingerprint::LocalDoomLoopKind;
use crate::budget::shared_state::SharedLoopState;
use crate::config::ExecutionBudget;
use crate::config::ExecutionUsage;
use crate::config::StuckHeuristics;
use crate::pricing::PricingFn;

/// Which axis a hard budget stop was triggered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetAxis {
    Tokens,
    Cost,
    Duration,
    Iterations,
}

impl BudgetAxis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tokens => "tokens",
            Self::Cost => "cost",
            Self::Duration => "duration",
            Self::Iterations => "iterations",
        }
    }
}

/// Why [`BudgetTracker::check_budget`] decided the run must stop.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// A hard cap on `axis` was exceeded.
    Budget { axis: BudgetAxis, hard: bool },
    /// A fingerprint's cross-worker count exceeded the shared threshold
    /// (spec §4.6).
    GlobalDoomLoop { fingerprint: String },
}

/// What the caller should do next when the run is allowed to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suggestion {
    RequestExtension,
    Warn,
}

/// The outcome of one `check_budget()` call (spec §4.5c).
#[derive(Debug, Clone)]
pub struct BudgetCheckResult {
    pub can_continue: bool,
    pub stop_reason: Option<StopReason>,
    pub suggestion: Option<Suggestion>,
    pub stuck_count: u32,
    /// Set when the local fingerprint ring shows a repeating pattern. Does
    /// not by itself stop the run; the caller may use it to emit a
    /// `doom_loop.detected` event.
    pub local_doom_loop: Option<(LocalDoomLoopKind, String)>,
}

/// A snapshot handed to the injected extension handler (spec §4.5d).
#[derive(Debug, Clone)]
pub struct ExtensionRequest {
    pub reason: String,
    pub usage: ExecutionUsage,
    pub current_budget: ExecutionBudget,
    pub suggested_budget: ExecutionBudget,
}

/// The result of a `request_extension` call.
#[derive(Debug, Clone)]
pub struct ExtensionOutcome {
    pub granted: bool,
    pub request: ExtensionRequest,
}

/// The injected collaborator that approves or denies budget extensions.
pub type ExtensionHandler = Arc<dyn Fn(ExtensionRequest) -> BoxFuture<'static, bool> + Send + Sync>;

/// Coarse classification of a tool call used for progress detection.
enum ToolClass {
    Read,
    Write,
    Command,
    Other,
}

fn classify(tool: &str) -> ToolClass {
    match tool {
        "read_file" => ToolClass::Read,
        "write_file" | "edit_file" => ToolClass::Write,
        "bash" => ToolClass::Command,
        _ => ToolClass::Other,
    }
}

fn extract_string_field(args_raw: &str, keys: &[&str]) -> Option<String> {
    let value: Value = serde_json::from_str(args_raw).ok()?;
    let map = value.as_object()?;
    for key in keys {
        if let Some(Value::String(s)) = map.get(*key) {
            return Some(s.clone());
        }
    }
    None
}

struct State {
    budget: ExecutionBudget,
    usage: ExecutionUsage,
    last_progress_at: Instant,
    files_read: HashSet<String>,
    files_modified: HashSet<String>,
    commands_run: HashSet<String>,
    stuck_count: u32,
    fingerprint_ring: VecDeque<String>,
}

/// Per-agent usage accounting, progress/doom-loop detection, and the
/// ordered budget check (spec §4.5).
pub struct BudgetTracker {
    state: Mutex<State>,
    started_at: Instant,
    heuristics: StuckHeuristics,
    pricing: PricingFn,
    shared_state: Option<Arc<SharedLoopState>>,
    extension_handler: Option<ExtensionHandler>,
}

impl BudgetTracker {
    pub fn new(budget: ExecutionBudget, pricing: PricingFn) -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(State {
                budget,
                usage: ExecutionUsage::default(),
                last_progress_at: now,
                files_read: HashSet::new(),
                files_modified: HashSet::new(),
                commands_run: HashSet::new(),
                stuck_count: 0,
                fingerprint_ring: VecDeque::new(),
            }),
            started_at: now,
            heuristics: StuckHeuristics::default(),
            pricing,
            shared_state: None,
            extension_handler: None,
        }
    }

    pub fn with_heuristics(mut self, heuristics: StuckHeuristics) -> Self {
        self.heuristics = heuristics;
        self
    }

    pub fn with_shared_state(mut self, shared_state: Arc<SharedLoopState>) -> Self {
        self.shared_state = Some(shared_state);
        self
    }

    pub fn with_extension_handler(mut self, handler: ExtensionHandler) -> Self {
        self.extension_handler = Some(handler);
        self
    }

    /// Records usage reported by an LLM call and advances the iteration
    /// count. If `actual_cost` is absent, cost is derived from the injected
    /// pricing function.
    pub fn record_llm(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        model: Option<&str>,
        actual_cost: Option<f64>,
    ) {
        let mut state = self.state.lock().expect("tracker lock poisoned");
        state.usage.input_tokens += input_tokens;
        state.usage.output_tokens += output_tokens;
        state.usage.cost += actual_cost
            .unwrap_or_else(|| (self.pricing)(model.unwrap_or("unknown"), input_tokens, output_tokens));
        state.usage.iterations += 1;
        state.usage.llm_calls += 1;
    }

    /// Records one tool call: updates the tool-call count, the fingerprint
    /// ring, file/command progress sets, and `stuck_count` (spec §4.5a/b).
    pub fn record_tool(&self, tool: &str, args_raw: &str, success: bool) {
        let fp = fingerprint::fingerprint(tool, args_raw);
        let mut state = self.state.lock().expect("tracker lock poisoned");
        state.usage.tool_calls += 1;
        fingerprint::push_ring(&mut state.fingerprint_ring, fp.clone());

        let iterations = state.usage.iterations;
        let made_progress = match classify(tool) {
            ToolClass::Read => {
                if iterations <= self.heuristics.exploration_window {
                    if let Some(path) = extract_string_field(args_raw, &["file_path", "path"]) {
                        state.files_read.insert(path);
                    }
                    true
                } else {
                    false
                }
            }
            ToolClass::Write if success => {
                if let Some(path) = extract_string_field(args_raw, &["file_path", "path"]) {
                    state.files_modified.insert(path);
                }
                true
            }
            ToolClass::Command if success => {
                if let Some(command) = extract_string_field(args_raw, &["command"]) {
                    state.commands_run.insert(command);
                }
                true
            }
            _ => false,
        };

        if made_progress {
            state.last_progress_at = Instant::now();
            state.stuck_count = 0;
        } else if Self::stuck_signal(&state, iterations, &self.heuristics) {
            state.stuck_count += 1;
        }

        if let Some(shared) = &self.shared_state {
            shared.record(&fp);
        }
    }

    fn stuck_signal(state: &State, iterations: u64, heuristics: &StuckHeuristics) -> bool {
        let hard = fingerprint::detect_local_doom_loop(&state.fingerprint_ring) == Some(LocalDoomLoopKind::Exact);
        let soft = iterations > heuristics.exploration_window
            && state.last_progress_at.elapsed() >= heuristics.progress_silence;
        hard || soft
    }

    /// Evaluates the full priority ladder (spec §4.5c) and returns whether
    /// the run may continue.
    pub fn check_budget(&self) -> BudgetCheckResult {
        let state = self.state.lock().expect("tracker lock poisoned");
        let elapsed = self.started_at.elapsed();
        let local_doom_loop = fingerprint::detect_local_doom_loop(&state.fingerprint_ring)
            .map(|kind| (kind, state.fingerprint_ring.back().cloned().unwrap_or_default()));

        let hard_stop = |axis: BudgetAxis| BudgetCheckResult {
            can_continue: false,
            stop_reason: Some(StopReason::Budget { axis, hard: true }),
            suggestion: None,
            stuck_count: state.stuck_count,
            local_doom_loop: local_doom_loop.clone(),
        };

        if state.usage.total_tokens() > state.budget.max_tokens {
            return hard_stop(BudgetAxis::Tokens);
        }
        if state.usage.cost > state.budget.max_cost {
            return hard_stop(BudgetAxis::Cost);
        }
        if elapsed > state.budget.max_duration {
            return hard_stop(BudgetAxis::Duration);
        }
        if state.usage.iterations > state.budget.max_iterations {
            return hard_stop(BudgetAxis::Iterations);
        }

        if let Some(shared) = &self.shared_state {
            if let Some(fp) = shared.global_doom_loop() {
                return BudgetCheckResult {
                    can_continue: false,
                    stop_reason: Some(StopReason::GlobalDoomLoop { fingerprint: fp }),
                    suggestion: None,
                    stuck_count: state.stuck_count,
                    local_doom_loop,
                };
            }
        }

        if state.usage.total_tokens() > state.budget.soft_token_threshold {
            return BudgetCheckResult {
                can_continue: true,
                stop_reason: None,
                suggestion: Some(Suggestion::RequestExtension),
                stuck_count: state.stuck_count,
                local_doom_loop,
            };
        }
        if state.usage.cost > state.budget.soft_cost_threshold {
            return BudgetCheckResult {
                can_continue: true,
                stop_reason: None,
                suggestion: Some(Suggestion::Warn),
                stuck_count: state.stuck_count,
                local_doom_loop,
            };
        }
        if state.stuck_count >= self.heuristics.stuck_strike_threshold {
            return BudgetCheckResult {
                can_continue: true,
                stop_reason: None,
                suggestion: Some(Suggestion::RequestExtension),
                stuck_count: state.stuck_count,
                local_doom_loop,
            };
        }

        BudgetCheckResult {
            can_continue: true,
            stop_reason: None,
            suggestion: None,
            stuck_count: state.stuck_count,
            local_doom_loop,
        }
    }

    /// Builds an [`ExtensionRequest`] snapshot, routes it through the
    /// injected handler, and widens the live budget by 50% on each axis if
    /// granted (spec §4.5d).
    pub async fn request_extension(&self, reason: impl Into<String>) -> ExtensionOutcome {
        let (current_budget, usage) = {
            let state = self.state.lock().expect("tracker lock poisoned");
            (state.budget, state.usage)
        };
        let request = ExtensionRequest {
            reason: reason.into(),
            usage,
            current_budget,
            suggested_budget: current_budget.widened(1.5),
        };

        let granted = match &self.extension_handler {
            Some(handler) => handler(request.clone()).await,
            None => false,
        };

        if granted {
            let mut state = self.state.lock().expect("tracker lock poisoned");
            state.budget = request.suggested_budget;
        }

        ExtensionOutcome { granted, request }
    }

    pub fn usage(&self) -> ExecutionUsage {
        let mut usage = self.state.lock().expect("tracker lock poisoned").usage;
        usage.elapsed_ms = self.started_at.elapsed().as_millis() as u64;
        usage
    }

    /// Zeroes accumulated usage without resetting the elapsed-time clock or
    /// any other tracker state (doom-loop ring, progress sets, budget).
    pub fn reset_usage(&self) {
        self.state.lock().expect("tracker lock poisoned").usage.reset();
    }

    pub fn budget(&self) -> ExecutionBudget {
        self.state.lock().expect("tracker lock poisoned").budget
    }

    pub fn files_read(&self) -> HashSet<String> {
        self.state.lock().expect("tracker lock poisoned").files_read.clone()
    }

    pub fn files_modified(&self) -> HashSet<String> {
        self.state
            .lock()
            .expect("tracker lock poisoned")
            .files_modified
            .clone()
    }

    pub fn commands_run(&self) -> HashSet<String> {
        self.state.lock().expect("tracker lock poisoned").commands_run.clone()
    }
}

#[cfg(test)]
#[path = "tracker.test.rs"]
mod tests;
