use super::*;

#[test]
fn below_threshold_is_not_a_global_loop() {
    let state = SharedLoopState::with_threshold(5);
    for _ in 0..5 {
        state.record("bash:npm test");
    }
    assert_eq!(state.count("bash:npm test"), 5);
    assert_eq!(state.global_doom_loop(), None);
}

#[test]
fn exceeding_threshold_reports_the_offending_fingerprint() {
    let state = SharedLoopState::with_threshold(5);
    for _ in 0..6 {
        state.record("bash:npm test");
    }
    assert_eq!(state.global_doom_loop().as_deref(), Some("bash:npm test"));
}

#[test]
fn distinct_fingerprints_are_tracked_independently() {
    let state = SharedLoopState::with_threshold(2);
    state.record("a");
    state.record("b");
    state.record("b");
    state.record("b");
    assert_eq!(state.count("a"), 1);
    assert_eq!(state.global_doom_loop().as_deref(), Some("b"));
}

#[test]
fn reset_clears_all_counts() {
    let state = SharedLoopState::with_threshold(1);
    state.record("a");
    state.record("a");
    assert!(state.global_doom_loop().is_some());
    state.reset();
    assert_eq!(state.count("a"), 0);
    assert_eq!(state.global_doom_loop(), None);
}

#[test]
fn default_threshold_matches_spec() {
    assert_eq!(DEFAULT_GLOBAL_THRESHOLD, 5);
}
