use std::time::Duration;

use agent_error::ErrorExt;

use super::*;

fn valid() -> ExecutionBudget {
    ExecutionBudget::new(1000, 1.0, Duration::from_secs(60), 10, 800, 0.8).unwrap()
}

#[test]
fn rejects_soft_token_threshold_at_or_above_hard_cap() {
    let err = ExecutionBudget::new(1000, 1.0, Duration::from_secs(60), 10, 1000, 0.8).unwrap_err();
    assert_eq!(err.status_code(), agent_error::StatusCode::InvalidArguments);
}

#[test]
fn rejects_soft_cost_threshold_at_or_above_hard_cap() {
    let err = ExecutionBudget::new(1000, 1.0, Duration::from_secs(60), 10, 800, 1.0).unwrap_err();
    assert_eq!(err.status_code(), agent_error::StatusCode::InvalidArguments);
}

#[test]
fn accepts_strictly_smaller_soft_thresholds() {
    assert!(ExecutionBudget::new(1000, 1.0, Duration::from_secs(60), 10, 800, 0.8).is_ok());
}

#[test]
fn widened_scales_every_axis_by_the_factor() {
    let budget = valid();
    let wider = budget.widened(1.5);
    assert_eq!(wider.max_tokens, 1500);
    assert!((wider.max_cost - 1.5).abs() < 1e-9);
    assert_eq!(wider.max_iterations, 15);
    assert_eq!(wider.max_duration, Duration::from_secs(90));
}

#[test]
fn widening_preserves_soft_thresholds() {
    let budget = valid();
    let wider = budget.widened(1.5);
    assert_eq!(wider.soft_token_threshold, budget.soft_token_threshold);
    assert_eq!(wider.soft_cost_threshold, budget.soft_cost_threshold);
}

#[test]
fn default_budget_has_soft_below_hard() {
    let budget = ExecutionBudget::default();
    assert!(budget.soft_token_threshold < budget.max_tokens);
    assert!(budget.soft_cost_threshold < budget.max_cost);
}

#[test]
fn usage_total_tokens_sums_input_and_output() {
    let usage = ExecutionUsage {
        input_tokens: 100,
        output_tokens: 50,
        ..Default::default()
    };
    assert_eq!(usage.total_tokens(), 150);
}

#[test]
fn default_stuck_heuristics_match_spec_constants() {
    let h = StuckHeuristics::default();
    assert_eq!(h.exploration_window, 5);
    assert_eq!(h.progress_silence, Duration::from_secs(60));
    assert_eq!(h.stuck_strike_threshold, 3);
    assert_eq!(h.fingerprint_ring_size, 10);
}
