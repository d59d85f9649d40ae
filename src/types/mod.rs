//! Shared result/error types for gridkeep.

mod error;

pub use error::{ErrorCode, GridkeepError, ProblemDetails, Result};
