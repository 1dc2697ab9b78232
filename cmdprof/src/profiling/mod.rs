//! Profiling channels
//!
//! This module contains the instrumentation a session can switch on:
//! - CPU sampling (pprof profile)
//! - Heap accounting and heap snapshots
//! - Execution tracing (Chrome trace JSON)
//! - Exclusive ownership of the process-wide sampler and tracer

pub mod cpu;
pub mod facility;
pub mod heap;
mod output;
pub mod trace;

// Re-export common types
pub use cpu::CpuSampler;
pub use facility::{Facility, Lease, CPU_SAMPLER, TRACER};
pub use heap::{HeapSnapshot, TrackingAllocator};
pub use trace::ExecutionTracer;
