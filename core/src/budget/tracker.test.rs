use std::time::Duration;

use super::*;
use crate::pricing::default_pricing_fn;

fn small_budget() -> ExecutionBudget {
    ExecutionBudget::new(1000, 1.0, Duration::from_secs(3600), 10, 500, 0.5).unwrap()
}

#[tokio::test]
async fn record_llm_accumulates_tokens_and_derives_cost() {
    let tracker = BudgetTracker::new(ExecutionBudget::default(), default_pricing_fn());
    tracker.record_llm(100, 50, Some("gpt-4o-mini"), None);
    tracker.record_llm(10, 10, Some("gpt-4o-mini"), None);
    let usage = tracker.usage();
    assert_eq!(usage.input_tokens, 110);
    assert_eq!(usage.output_tokens, 60);
    assert_eq!(usage.iterations, 2);
    assert!(usage.cost > 0.0);
}

#[tokio::test]
async fn record_llm_prefers_actual_cost_when_given() {
    let tracker = BudgetTracker::new(ExecutionBudget::default(), default_pricing_fn());
    tracker.record_llm(100, 50, Some("gpt-4o-mini"), Some(0.25));
    assert_eq!(tracker.usage().cost, 0.25);
}

#[tokio::test]
async fn record_tool_tracks_writes_only_on_success() {
    let tracker = BudgetTracker::new(ExecutionBudget::default(), default_pricing_fn());
    tracker.record_llm(1, 1, None, Some(0.0));
    tracker.record_tool("write_file", r#"{"file_path":"/a","content":"x"}"#, true);
    tracker.record_tool("write_file", r#"{"file_path":"/b","content":"x"}"#, false);
    let modified = tracker.files_modified();
    assert!(modified.contains("/a"));
    assert!(!modified.contains("/b"));
    assert_eq!(tracker.usage().tool_calls, 2);
}

#[tokio::test]
async fn reads_count_as_progress_only_within_exploration_window() {
    let tracker = BudgetTracker::new(ExecutionBudget::default(), default_pricing_fn());
    for i in 0..6 {
        tracker.record_llm(1, 1, None, Some(0.0));
        tracker.record_tool("read_file", &format!(r#"{{"file_path":"/f{i}"}}"#), true);
    }
    let reads = tracker.files_read();
    assert_eq!(reads.len(), 5, "only reads within the first 5 iterations count");
}

#[tokio::test]
async fn hard_token_cap_takes_priority_over_everything_else() {
    let tracker = BudgetTracker::new(small_budget(), default_pricing_fn());
    tracker.record_llm(2000, 0, None, Some(0.0));
    let result = tracker.check_budget();
    assert!(!result.can_continue);
    assert_eq!(
        result.stop_reason,
        Some(StopReason::Budget {
            axis: BudgetAxis::Tokens,
            hard: true
        })
    );
}

#[tokio::test]
async fn hard_cost_cap_checked_before_duration_and_iterations() {
    let tracker = BudgetTracker::new(small_budget(), default_pricing_fn());
    tracker.record_llm(1, 1, None, Some(2.0));
    let result = tracker.check_budget();
    assert_eq!(
        result.stop_reason,
        Some(StopReason::Budget {
            axis: BudgetAxis::Cost,
            hard: true
        })
    );
}

#[tokio::test]
async fn hard_iteration_cap_fires_when_only_iterations_are_exceeded() {
    let tracker = BudgetTracker::new(small_budget(), default_pricing_fn());
    for _ in 0..11 {
        tracker.record_llm(1, 0, None, Some(0.0));
    }
    let result = tracker.check_budget();
    assert_eq!(
        result.stop_reason,
        Some(StopReason::Budget {
            axis: BudgetAxis::Iterations,
            hard: true
        })
    );
}

#[tokio::test(start_paused = true)]
async fn hard_duration_cap_fires_after_the_clock_advances() {
    let budget = ExecutionBudget::new(1000, 1.0, Duration::from_secs(60), 10, 500, 0.5).unwrap();
    let tracker = BudgetTracker::new(budget, default_pricing_fn());
    tokio::time::advance(Duration::from_secs(61)).await;
    let result = tracker.check_budget();
    assert_eq!(
        result.stop_reason,
        Some(StopReason::Budget {
            axis: BudgetAxis::Duration,
            hard: true
        })
    );
}

#[tokio::test]
async fn soft_token_threshold_suggests_extension_without_stopping() {
    let tracker = BudgetTracker::new(small_budget(), default_pricing_fn());
    tracker.record_llm(600, 0, None, Some(0.0));
    let result = tracker.check_budget();
    assert!(result.can_continue);
    assert_eq!(result.stop_reason, None);
    assert_eq!(result.suggestion, Some(Suggestion::RequestExtension));
}

#[tokio::test]
async fn soft_cost_threshold_suggests_warn() {
    let tracker = BudgetTracker::new(small_budget(), default_pricing_fn());
    tracker.record_llm(1, 1, None, Some(0.6));
    let result = tracker.check_budget();
    assert!(result.can_continue);
    assert_eq!(result.suggestion, Some(Suggestion::Warn));
}

#[tokio::test(start_paused = true)]
async fn stuck_count_reaching_threshold_suggests_extension() {
    let tracker = BudgetTracker::new(ExecutionBudget::default(), default_pricing_fn());
    for i in 0..8 {
        tracker.record_llm(1, 0, None, Some(0.0));
        tokio::time::advance(Duration::from_secs(61)).await;
        tracker.record_tool("noop_tool", &format!(r#"{{"n":{i}}}"#), true);
    }
    let result = tracker.check_budget();
    assert!(result.stuck_count >= 3);
    assert_eq!(result.suggestion, Some(Suggestion::RequestExtension));
    assert!(result.can_continue);
}

#[tokio::test]
async fn exact_repeated_calls_surface_as_local_doom_loop_without_stopping() {
    let tracker = BudgetTracker::new(ExecutionBudget::default(), default_pricing_fn());
    tracker.record_llm(1, 0, None, Some(0.0));
    for _ in 0..3 {
        tracker.record_tool("read_file", r#"{"file_path":"/foo"}"#, true);
    }
    let result = tracker.check_budget();
    assert!(result.can_continue);
    assert!(matches!(
        result.local_doom_loop,
        Some((fingerprint::LocalDoomLoopKind::Exact, _))
    ));
}

#[tokio::test]
async fn chunked_reads_at_different_offsets_are_not_a_local_doom_loop() {
    let tracker = BudgetTracker::new(ExecutionBudget::default(), default_pricing_fn());
    tracker.record_llm(1, 0, None, Some(0.0));
    for offset in [0, 100, 200] {
        tracker.record_tool(
            "read_file",
            &format!(r#"{{"file_path":"/big","offset":{offset},"limit":100}}"#),
            true,
        );
    }
    let result = tracker.check_budget();
    assert!(result.local_doom_loop.is_none());
}

#[tokio::test]
async fn global_doom_loop_stops_every_tracker_sharing_the_state() {
    let shared = Arc::new(crate::budget::shared_state::SharedLoopState::with_threshold(2));
    let tracker = BudgetTracker::new(ExecutionBudget::default(), default_pricing_fn())
        .with_shared_state(Arc::clone(&shared));
    for _ in 0..3 {
        tracker.record_tool("bash", r#"{"command":"flaky"}"#, true);
    }
    let result = tracker.check_budget();
    assert!(!result.can_continue);
    assert!(matches!(result.stop_reason, Some(StopReason::GlobalDoomLoop { .. })));
}

#[tokio::test]
async fn extension_denied_leaves_budget_unchanged() {
    let tracker = BudgetTracker::new(small_budget(), default_pricing_fn());
    let outcome = tracker.request_extension("stuck").await;
    assert!(!outcome.granted);
    assert_eq!(tracker.budget().max_tokens, small_budget().max_tokens);
}

#[tokio::test]
async fn extension_granted_widens_budget_by_half() {
    let handler: ExtensionHandler = Arc::new(|_req| Box::pin(async { true }));
    let tracker = BudgetTracker::new(small_budget(), default_pricing_fn()).with_extension_handler(handler);
    let outcome = tracker.request_extension("stuck").await;
    assert!(outcome.granted);
    assert_eq!(tracker.budget().max_tokens, 1500);
    assert_eq!(outcome.request.suggested_budget.max_tokens, 1500);
}
