//! Domain types naming the instrumentation channels a session manages

use std::fmt;

/// One instrumentation channel of a profiling session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Periodic stack sampling written as a pprof CPU profile
    Cpu,
    /// Point-in-time allocation snapshot written as a pprof heap profile
    Heap,
    /// Chronological span/event record written as Chrome trace JSON
    Trace,
    /// Live debug-variable HTTP endpoint
    DebugEndpoint,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Cpu => "CPU profile",
            Channel::Heap => "heap profile",
            Channel::Trace => "execution trace",
            Channel::DebugEndpoint => "debug endpoint",
        };
        f.write_str(name)
    }
}
