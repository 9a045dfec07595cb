//! The injected pricing collaborator (spec §6): `(model, input_tokens,
//! output_tokens) -> USD`.

use std::sync::Arc;

/// A deterministic pricing function. Given a model name and token counts,
/// returns the cost in USD. Unknown models must fall back to a conservative
/// mid-tier estimate rather than erroring.
pub type PricingFn = Arc<dyn Fn(&str, u64, u64) -> f64 + Send + Sync>;

/// Per-million-token rates for a handful of well-known models, plus the
/// fallback tier used for anything not listed (approximately Gemini Flash
/// pricing, per spec §6).
const KNOWN_RATES: &[(&str, f64, f64)] = &[
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4o-mini", 0.15, 0.60),
    ("claude-3-5-sonnet", 3.00, 15.00),
    ("claude-3-5-haiku", 0.80, 4.00),
    ("gemini-1.5-pro", 1.25, 5.00),
    ("gemini-1.5-flash", 0.075, 0.30),
];

const FALLBACK_INPUT_RATE: f64 = 0.075;
const FALLBACK_OUTPUT_RATE: f64 = 0.30;

/// The default pricing function, used when no collaborator is injected.
/// Deterministic: the same `(model, input, output)` always yields the same
/// cost.
pub fn default_pricing(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let (input_rate, output_rate) = KNOWN_RATES
        .iter()
        .find(|(name, _, _)| *name == model)
        .map(|(_, i, o)| (*i, *o))
        .unwrap_or((FALLBACK_INPUT_RATE, FALLBACK_OUTPUT_RATE));

    (input_tokens as f64 / 1_000_000.0) * input_rate + (output_tokens as f64 / 1_000_000.0) * output_rate
}

/// Wraps [`default_pricing`] as a [`PricingFn`].
pub fn default_pricing_fn() -> PricingFn {
    Arc::new(default_pricing)
}

#[cfg(test)]
#[path = "pricing.test.rs"]
mod tests;
