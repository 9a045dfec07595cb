use super::*;

#[test]
fn known_model_uses_its_own_rate() {
    let cost = default_pricing("gpt-4o-mini", 1_000_000, 1_000_000);
    assert!((cost - 0.75).abs() < 1e-9);
}

#[test]
fn unknown_model_falls_back_to_flash_tier() {
    let known = default_pricing("gemini-1.5-flash", 1_000_000, 500_000);
    let unknown = default_pricing("some-future-model-v9", 1_000_000, 500_000);
    assert!((known - unknown).abs() < 1e-9);
}

#[test]
fn is_deterministic() {
    let a = default_pricing("claude-3-5-sonnet", 12_345, 6_789);
    let b = default_pricing("claude-3-5-sonnet", 12_345, 6_789);
    assert_eq!(a, b);
}

#[test]
fn zero_tokens_cost_nothing() {
    assert_eq!(default_pricing("gpt-4o", 0, 0), 0.0);
}
