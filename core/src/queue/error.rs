//! Errors for the submission/event queues (spec §7).

use agent_error::ErrorExt;
use agent_error::Location;
use agent_error::StatusCode;
use agent_error::fmt_error_chain;
use snafu::Snafu;

#[derive(Snafu)]
#[snafu(visibility(pub(crate)), module)]
pub enum QueueError {
    /// `submit()` or `take()` called after `close()`.
    #[snafu(display("submission queue is closed"))]
    Closed {
        #[snafu(implicit)]
        location: Location,
    },

    /// A producer's backpressure wait expired before a slot opened.
    #[snafu(display("submit() timed out waiting for queue capacity"))]
    Timeout {
        #[snafu(implicit)]
        location: Location,
    },
}

impl std::fmt::Debug for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_error_chain(self, f)
    }
}

impl ErrorExt for QueueError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Closed { .. } => StatusCode::QueueClosed,
            Self::Timeout { .. } => StatusCode::QueueTimeout,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
