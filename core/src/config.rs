//! Execution budget configuration (spec §4.5) and other tunables exposed
//! as explicit config rather than hard-coded constants, per the spec's
//! design notes on stuck-state heuristics.

use std::time::Duration;

use agent_error::ErrorExt;
use agent_error::Location;
use agent_error::StatusCode;
use agent_error::fmt_error_chain;
use snafu::Snafu;

#[derive(Snafu)]
#[snafu(visibility(pub(crate)), module)]
pub enum ConfigError {
    #[snafu(display("soft {axis} threshold ({soft}) must be less than the hard cap ({hard})"))]
    SoftExceedsHard {
        axis: &'static str,
        soft: f64,
        hard: f64,
        #[snafu(implicit)]
        location: Location,
    },
}

impl std::fmt::Debug for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_error_chain(self, f)
    }
}

impl ErrorExt for ConfigError {
    fn status_code(&self) -> StatusCode {
        StatusCode::InvalidArguments
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Hard and soft caps for one agent-loop run (spec §4.5).
///
/// Soft thresholds are advisory: crossing one suggests an extension request
/// or a warning but never stops the loop. Hard caps are load-bearing: the
/// first one exceeded, checked in the fixed order tokens/cost/duration/
/// iterations, stops the run.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionBudget {
    pub max_tokens: u64,
    pub max_cost: f64,
    pub max_duration: Duration,
    pub max_iterations: u64,
    pub soft_token_threshold: u64,
    pub soft_cost_threshold: f64,
}

impl ExecutionBudget {
    /// Builds a budget, rejecting any soft threshold that does not sit
    /// strictly below its corresponding hard cap.
    pub fn new(
        max_tokens: u64,
        max_cost: f64,
        max_duration: Duration,
        max_iterations: u64,
        soft_token_threshold: u64,
        soft_cost_threshold: f64,
    ) -> Result<Self> {
        if soft_token_threshold >= max_tokens {
            return config_error::SoftExceedsHardSnafu {
                axis: "tokens",
                soft: soft_token_threshold as f64,
                hard: max_tokens as f64,
            }
            .fail();
        }
        if soft_cost_threshold >= max_cost {
            return config_error::SoftExceedsHardSnafu {
                axis: "cost",
                soft: soft_cost_threshold,
                hard: max_cost,
            }
            .fail();
        }
        Ok(Self {
            max_tokens,
            max_cost,
            max_duration,
            max_iterations,
            soft_token_threshold,
            soft_cost_threshold,
        })
    }

    /// Returns a copy of `self` with every axis widened by `factor` (spec
    /// §4.5d: extensions suggest +50%, i.e. `factor = 1.5`).
    pub fn widened(&self, factor: f64) -> Self {
        Self {
            max_tokens: (self.max_tokens as f64 * factor) as u64,
            max_cost: self.max_cost * factor,
            max_duration: Duration::from_secs_f64(self.max_duration.as_secs_f64() * factor),
            max_iterations: (self.max_iterations as f64 * factor) as u64,
            soft_token_threshold: self.soft_token_threshold,
            soft_cost_threshold: self.soft_cost_threshold,
        }
    }
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self {
            max_tokens: 1_000_000,
            max_cost: 10.0,
            max_duration: Duration::from_secs(30 * 60),
            max_iterations: 50,
            soft_token_threshold: 800_000,
            soft_cost_threshold: 8.0,
        }
    }
}

/// Running totals accumulated by a [`crate::budget::BudgetTracker`] over the
/// life of one run.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct ExecutionUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub elapsed_ms: u64,
    pub iterations: u64,
    pub tool_calls: u64,
    pub llm_calls: u64,
}

impl ExecutionUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Zeroes every running total. The only sanctioned way to reset usage
    /// mid-run (spec §4.5a) — no field is ever decremented in place.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Stuck-state heuristic constants (spec §9 design notes), exposed as
/// configuration rather than hard-coded.
#[derive(Debug, Clone, Copy)]
pub struct StuckHeuristics {
    pub exploration_window: u64,
    pub progress_silence: Duration,
    pub stuck_strike_threshold: u32,
    pub fingerprint_ring_size: usize,
}

impl Default for StuckHeuristics {
    fn default() -> Self {
        Self {
            exploration_window: 5,
            progress_silence: Duration::from_secs(60),
            stuck_strike_threshold: 3,
            fingerprint_ring_size: crate::budget::fingerprint::RING_SIZE,
        }
    }
}

#[cfg(test)]
#[path = "config.test.rs"]
mod tests;
