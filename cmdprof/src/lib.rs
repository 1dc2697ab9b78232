//! # cmdprof - Profiling Hooks for Command-Line Tools
//!
//! cmdprof switches diagnostic instrumentation on before a command body runs and
//! tears it down afterward. It does not know what the command does; it only owns
//! the instrumentation resources for the duration of one session.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Command dispatch (CLI layer)                 │
//! │        ProfileArgs ──▶ ProfilingConfig ──▶ Session           │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │ start()                      │ stop()
//!                 ▼                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     ProfilingSession                         │
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐        │
//! │  │ Debug        │  │ CPU sampler  │  │ Execution    │        │
//! │  │ endpoint     │  │ (pprof)      │  │ tracer       │        │
//! │  │ (detached)   │  │              │  │ (tracing)    │        │
//! │  └──────────────┘  └──────┬───────┘  └──────┬───────┘        │
//! │                           │   ┌──────────────┐  │            │
//! │                           │   │ Heap         │  │            │
//! │                           │   │ snapshot     │  │            │
//! │                           │   └──────┬───────┘  │            │
//! └───────────────────────────┼──────────┼──────────┼────────────┘
//!                             ▼          ▼          ▼
//!                          cpu.pb.gz  heap.pb.gz  trace.json
//! ```
//!
//! ## Module Structure
//!
//! - [`session`]: the two lifecycle hooks and their ordering rules
//! - [`config`]: immutable per-session settings; empty values disable a channel
//! - [`profiling`]: the channels themselves
//!   - `cpu`: pprof CPU sampling, written as gzip-compressed `profile.proto`
//!   - `heap`: allocation accounting allocator and heap snapshots
//!   - `trace`: records `tracing` spans/events while a trace is active
//!   - `facility`: exclusive ownership of the process-wide sampler and tracer
//! - [`debug`]: debug-variable registry and the detached HTTP endpoint
//! - [`export`]: Chrome Trace Event Format writer used by the tracer
//! - [`cli`]: clap flags mirroring the configuration
//! - [`domain`]: channel names and error types
//!
//! ## Typical Usage
//!
//! ```no_run
//! use cmdprof::{ProfilingConfig, ProfilingSession};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ProfilingConfig::new()
//!     .with_cpu_profile("cpu.out")
//!     .with_mem_profile("mem.out");
//! let mut session = ProfilingSession::new(config);
//! session.run(|| {
//!     // command body
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod debug;
pub mod domain;
pub mod export;
pub mod profiling;
pub mod session;

pub use config::ProfilingConfig;
pub use domain::{Channel, ProfilingError};
pub use session::ProfilingSession;
