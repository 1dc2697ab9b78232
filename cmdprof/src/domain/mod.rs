//! Domain model for cmdprof
//!
//! This module contains core domain types and errors that provide:
//! - Named instrumentation channels for error messages and logs
//! - Structured error handling

pub mod errors;
pub mod types;

pub use types::Channel;

pub use errors::{ProfilingError, VarError};
