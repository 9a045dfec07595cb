//! Unified status codes for error classification.
//!
//! Status code format: XX_YYY (5-digit)
//! - XX = Category (00-99)
//! - YYY = Code within category (000-999)
//!
//! Category layout:
//! - General/Core (01-09): Common, Input, IO, Network
//! - Business (10-13): Config, Resource, Agent

use strum::AsRefStr;
use strum::EnumIter;
use strum::FromRepr;

/// Status code metadata.
#[derive(Debug, Clone, Copy)]
pub struct StatusMeta {
    pub retryable: bool,
    pub log_error: bool,
    pub category: StatusCategory,
}

/// Status code category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    /// Success (00_xxx)
    Success,
    /// Common/internal errors (01_xxx)
    Common,
    /// Parameter/validation errors (02_xxx)
    Input,
    /// IO/storage errors (03_xxx)
    IO,
    /// Concurrency/timing errors (04_xxx)
    Concurrency,
    /// Resource limits (12_xxx)
    Resource,
    /// Agent-runtime-specific errors (13_xxx)
    Agent,
}

macro_rules! define_status_codes {
    ($(
        $(#[$attr:meta])*
        $name:ident = $value:expr => {
            retryable: $retry:expr,
            log_error: $log:expr,
            category: $cat:ident $(,)?
        }
    ),* $(,)?) => {
        /// Status codes for error classification.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter, FromRepr)]
        #[repr(i32)]
        pub enum StatusCode {
            $($(#[$attr])* $name = $value,)*
        }

        impl StatusCode {
            /// Returns the metadata for this status code.
            pub const fn meta(&self) -> StatusMeta {
                match self {
                    $(Self::$name => StatusMeta {
                        retryable: $retry,
                        log_error: $log,
                        category: StatusCategory::$cat,
                    },)*
                }
            }

            /// Returns the string name of this status code.
            pub const fn name(&self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }
        }

        const _: () = {
            const CODES: &[i32] = &[$($value),*];
            const fn check_unique() {
                let mut i = 0;
                while i < CODES.len() {
                    let mut j = i + 1;
                    while j < CODES.len() {
                        if CODES[i] == CODES[j] {
                            panic!("Duplicate status code value detected");
                        }
                        j += 1;
                    }
                    i += 1;
                }
            }
            check_unique();
        };
    };
}

define_status_codes! {
    // ====== Success (00_xxx) ======
    Success = 00_000 => { retryable: false, log_error: false, category: Success },

    // ====== Common errors (01_xxx) ======
    Unknown = 01_000 => { retryable: false, log_error: true, category: Common },
    Internal = 01_001 => { retryable: true, log_error: true, category: Common },
    Unsupported = 01_002 => { retryable: false, log_error: false, category: Common },
    /// Cooperative cancellation via a token or shutdown signal.
    Cancelled = 01_003 => { retryable: false, log_error: false, category: Common },

    // ====== Input/Validation errors (02_xxx) ======
    InvalidArguments = 02_000 => { retryable: false, log_error: false, category: Input },
    ParseError = 02_001 => { retryable: false, log_error: false, category: Input },

    // ====== IO/Storage errors (03_xxx) ======
    IoError = 03_000 => { retryable: false, log_error: false, category: IO },

    // ====== Concurrency/timing errors (04_xxx) ======
    /// A bounded queue was closed while a producer or consumer was waiting.
    QueueClosed = 04_000 => { retryable: false, log_error: false, category: Concurrency },
    /// A producer timed out waiting for queue capacity.
    QueueTimeout = 04_001 => { retryable: true, log_error: false, category: Concurrency },
    /// A model call or worker exceeded its deadline.
    Timeout = 04_002 => { retryable: true, log_error: false, category: Concurrency },

    // ====== Resource/limit errors (12_xxx) ======
    RateLimited = 12_000 => { retryable: true, log_error: false, category: Resource },
    ResourcesExhausted = 12_001 => { retryable: true, log_error: false, category: Resource },

    // ====== Agent-runtime errors (13_xxx) ======
    /// A hard execution budget cap (tokens/cost/duration/iterations) was exceeded.
    BudgetExceeded = 13_000 => { retryable: false, log_error: false, category: Agent },
    /// A doom loop (local or cross-worker) was detected.
    LoopDetected = 13_001 => { retryable: false, log_error: false, category: Agent },
    /// A blackboard resource claim was denied because another agent holds it.
    ToolConflict = 13_002 => { retryable: true, log_error: false, category: Agent },
    /// A tool reported its own failure result.
    ToolError = 13_003 => { retryable: false, log_error: false, category: Agent },
    /// An operation handler registered with the protocol bridge threw.
    OperationHandlerError = 13_004 => { retryable: true, log_error: true, category: Agent },
    /// A structural contract was broken (e.g. merging into a nonexistent thread).
    InvariantViolation = 13_005 => { retryable: false, log_error: true, category: Agent },
}

impl StatusCode {
    /// Returns true if `code` is success.
    pub fn is_success(code: i32) -> bool {
        Self::Success as i32 == code
    }

    /// Returns true if the error is retryable.
    pub const fn is_retryable(&self) -> bool {
        self.meta().retryable
    }

    /// Returns true if the error should be logged.
    pub const fn should_log_error(&self) -> bool {
        self.meta().log_error
    }

    /// Returns the category of this status code.
    pub const fn category(&self) -> StatusCategory {
        self.meta().category
    }

    /// Convert from i32.
    pub fn from_i32(value: i32) -> Option<Self> {
        Self::from_repr(value)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_match_code_ranges() {
        assert_eq!(StatusCode::QueueClosed as i32 / 1000, 4);
        assert_eq!(StatusCode::BudgetExceeded as i32 / 1000, 13);
    }

    #[test]
    fn budget_and_loop_errors_are_not_retryable() {
        assert!(!StatusCode::BudgetExceeded.is_retryable());
        assert!(!StatusCode::LoopDetected.is_retryable());
    }

    #[test]
    fn tool_conflict_is_retryable() {
        assert!(StatusCode::ToolConflict.is_retryable());
    }

    #[test]
    fn operation_handler_errors_are_logged() {
        assert!(StatusCode::OperationHandlerError.should_log_error());
    }

    #[test]
    fn from_i32_roundtrips() {
        assert_eq!(StatusCode::from_i32(13_000), Some(StatusCode::BudgetExceeded));
        assert_eq!(StatusCode::from_i32(99_999), None);
    }
}
