//! Live debug-variable endpoint
//!
//! - [`vars`]: process-wide registry of named variables rendered as JSON
//! - [`server`]: detached HTTP listener serving `/debug/vars` and `/debug/pprof/heap`
//!
//! The endpoint is plain HTTP without authentication; restrict exposure through
//! the bind address.

pub mod server;
pub mod vars;

pub use server::{DebugEndpoint, EndpointStatus};
pub use vars::{registry, Int, Registry, Text};
