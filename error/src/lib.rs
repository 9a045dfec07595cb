//! Shared error plumbing for the agent runtime workspace.
//!
//! Every crate-local error enum derives `snafu::Snafu`, implements
//! [`ErrorExt`], and hand-writes its `Debug` impl via [`fmt_error_chain`].

mod ext;
mod location;
mod status_code;

pub use ext::ErrorExt;
pub use ext::fmt_error_chain;
pub use location::Location;
pub use status_code::StatusCategory;
pub use status_code::StatusCode;
pub use status_code::StatusMeta;
