//! CLI argument definitions

use crate::config::{ProfilingConfig, DEFAULT_CPU_FREQUENCY};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cmdprof",
    version,
    about = "Run a command with optional CPU, heap and trace profiling",
    after_help = "\
EXAMPLES:
    cmdprof --cpuprofile cpu.out --memprofile mem.out burn    Profile a CPU-bound workload
    cmdprof --traceprofile trace.json burn --millis 200        Record an execution trace
    cmdprof --expvar 127.0.0.1:6060 serve --seconds 30         Inspect /debug/vars live"
)]
pub struct Args {
    #[command(flatten)]
    pub profile: ProfileArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Profiling flags shared by every subcommand
///
/// Values are plain strings so that an empty value disables the channel.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ProfileArgs {
    /// Bind address for the debug variable endpoint, default none
    #[arg(long = "expvar", value_name = "ADDR", global = true)]
    pub expvar_bind: Option<String>,

    /// CPU profile output file, default none
    #[arg(long = "cpuprofile", value_name = "FILE", global = true)]
    pub cpu_profile: Option<String>,

    /// Heap profile output file, default none
    #[arg(long = "memprofile", value_name = "FILE", global = true)]
    pub mem_profile: Option<String>,

    /// Execution trace output file, default none
    #[arg(long = "traceprofile", value_name = "FILE", global = true)]
    pub trace_profile: Option<String>,

    /// CPU sampling rate in Hz
    #[arg(long, default_value_t = DEFAULT_CPU_FREQUENCY, global = true)]
    pub cpu_frequency: i32,

    /// Stop already-enabled profilers when a later one fails to start
    #[arg(long, global = true)]
    pub rollback_on_failure: bool,
}

impl From<&ProfileArgs> for ProfilingConfig {
    fn from(args: &ProfileArgs) -> Self {
        let mut config = ProfilingConfig::new()
            .with_cpu_frequency(args.cpu_frequency)
            .with_rollback_on_failure(args.rollback_on_failure);
        if let Some(ref bind) = args.expvar_bind {
            config = config.with_expvar_bind(bind.clone());
        }
        if let Some(ref path) = args.cpu_profile {
            config = config.with_cpu_profile(path.clone());
        }
        if let Some(ref path) = args.mem_profile {
            config = config.with_mem_profile(path.clone());
        }
        if let Some(ref path) = args.trace_profile {
            config = config.with_trace_profile(path.clone());
        }
        config
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Spin the CPU and churn allocations inside traced spans
    Burn {
        /// How long to keep the CPU busy
        #[arg(long, default_value = "500")]
        millis: u64,

        /// Number of allocation rounds to perform
        #[arg(long, default_value = "64")]
        rounds: usize,
    },

    /// Stay alive so the debug endpoint can be queried
    Serve {
        /// Stop after N seconds (0 = until interrupted)
        #[arg(long, default_value = "0")]
        seconds: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_flags_map_to_config() {
        let args = Args::parse_from([
            "cmdprof",
            "--cpuprofile",
            "cpu.out",
            "--memprofile",
            "mem.out",
            "burn",
            "--millis",
            "10",
        ]);
        let config = ProfilingConfig::from(&args.profile);
        assert_eq!(config.cpu_profile(), Some(Path::new("cpu.out")));
        assert_eq!(config.mem_profile(), Some(Path::new("mem.out")));
        assert!(config.trace_profile().is_none());
        assert!(config.expvar_bind().is_none());
        assert!(matches!(args.command, Command::Burn { millis: 10, .. }));
    }

    #[test]
    fn test_flags_accepted_after_subcommand() {
        let args = Args::parse_from(["cmdprof", "serve", "--traceprofile", "trace.json"]);
        let config = ProfilingConfig::from(&args.profile);
        assert_eq!(config.trace_profile(), Some(Path::new("trace.json")));
    }

    #[test]
    fn test_empty_flag_disables_channel() {
        let args = Args::parse_from(["cmdprof", "--cpuprofile", "", "serve"]);
        let config = ProfilingConfig::from(&args.profile);
        assert!(config.is_disabled());
    }
}
