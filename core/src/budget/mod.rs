//! Budget tracking: usage accounting, progress/doom-loop detection, and
//! cross-worker shared state (spec §4.5–4.6, C5–C6).

pub mod fingerprint;
pub mod shared_state;
pub mod tracker;

pub use fingerprint::LocalDoomLoopKind;
pub use shared_state::SharedLoopState;
pub use tracker::BudgetAxis;
pub use tracker::BudgetCheckResult;
pub use tracker::BudgetTracker;
pub use tracker::ExtensionHandler;
pub use tracker::ExtensionOutcome;
pub use tracker::ExtensionRequest;
pub use tracker::StopReason;
pub use tracker::Suggestion;
