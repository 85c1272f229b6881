//! # flowcc-error
//!
//! Error type shared by the flowcc crates.
//!
//! - **ErrorKind** says what went wrong (parse failure, bad config, io).
//! - **ErrorStatus** says whether trying again can help.
//! - Context pairs and the operation name point at where it happened.
//!
//! ```rust
//! use flowcc_error::{Error, ErrorKind};
//!
//! fn load() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::ParseFailed, "unexpected indent")
//!         .with_operation("py::parse_program")
//!         .with_context("line", "12"))
//! }
//! ```
//!
//! The diagram pipeline itself never surfaces these to the user as a crash:
//! a parse error turns into a one-node error diagram. They exist for the
//! front end and the CLI, where a caller can still act on them.

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the flowcc Error
pub type Result<T> = std::result::Result<T, Error>;
