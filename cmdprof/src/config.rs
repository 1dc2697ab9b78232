//! Profiling session configuration
//!
//! Every channel is disabled unless its destination is set. Empty strings coming
//! from flag parsing count as unset.

use std::path::{Path, PathBuf};

/// Default CPU sampling rate in Hz
pub const DEFAULT_CPU_FREQUENCY: i32 = 100;

/// Immutable settings for one profiling session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilingConfig {
    expvar_bind: Option<String>,
    cpu_profile: Option<PathBuf>,
    mem_profile: Option<PathBuf>,
    trace_profile: Option<PathBuf>,
    cpu_frequency: i32,
    rollback_on_failure: bool,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            expvar_bind: None,
            cpu_profile: None,
            mem_profile: None,
            trace_profile: None,
            cpu_frequency: DEFAULT_CPU_FREQUENCY,
            rollback_on_failure: false,
        }
    }
}

impl ProfilingConfig {
    /// Configuration with every channel disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind address for the debug-variable HTTP endpoint
    #[must_use]
    pub fn with_expvar_bind(mut self, bind: impl Into<String>) -> Self {
        self.expvar_bind = non_empty(bind.into());
        self
    }

    /// Destination file for the CPU profile
    #[must_use]
    pub fn with_cpu_profile(mut self, path: impl Into<PathBuf>) -> Self {
        self.cpu_profile = non_empty_path(path.into());
        self
    }

    /// Destination file for the heap snapshot
    #[must_use]
    pub fn with_mem_profile(mut self, path: impl Into<PathBuf>) -> Self {
        self.mem_profile = non_empty_path(path.into());
        self
    }

    /// Destination file for the execution trace
    #[must_use]
    pub fn with_trace_profile(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace_profile = non_empty_path(path.into());
        self
    }

    /// CPU sampling rate in Hz (non-positive values fall back to the default)
    #[must_use]
    pub fn with_cpu_frequency(mut self, hz: i32) -> Self {
        self.cpu_frequency = if hz > 0 { hz } else { DEFAULT_CPU_FREQUENCY };
        self
    }

    /// Stop channels already enabled when a later one fails during start
    #[must_use]
    pub fn with_rollback_on_failure(mut self, rollback: bool) -> Self {
        self.rollback_on_failure = rollback;
        self
    }

    pub fn expvar_bind(&self) -> Option<&str> {
        self.expvar_bind.as_deref()
    }

    pub fn cpu_profile(&self) -> Option<&Path> {
        self.cpu_profile.as_deref()
    }

    pub fn mem_profile(&self) -> Option<&Path> {
        self.mem_profile.as_deref()
    }

    pub fn trace_profile(&self) -> Option<&Path> {
        self.trace_profile.as_deref()
    }

    pub fn cpu_frequency(&self) -> i32 {
        self.cpu_frequency
    }

    pub fn rollback_on_failure(&self) -> bool {
        self.rollback_on_failure
    }

    /// True when no channel is enabled
    pub fn is_disabled(&self) -> bool {
        self.expvar_bind.is_none()
            && self.cpu_profile.is_none()
            && self.mem_profile.is_none()
            && self.trace_profile.is_none()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn non_empty_path(path: PathBuf) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_disables_everything() {
        let config = ProfilingConfig::default();
        assert!(config.is_disabled());
        assert_eq!(config.cpu_frequency(), DEFAULT_CPU_FREQUENCY);
        assert!(!config.rollback_on_failure());
    }

    #[test]
    fn test_empty_values_mean_disabled() {
        let config = ProfilingConfig::new()
            .with_expvar_bind("")
            .with_cpu_profile("")
            .with_mem_profile("")
            .with_trace_profile("");
        assert!(config.is_disabled());
    }

    #[test]
    fn test_setters_enable_channels() {
        let config = ProfilingConfig::new()
            .with_cpu_profile("cpu.out")
            .with_mem_profile("mem.out")
            .with_cpu_frequency(0);
        assert_eq!(config.cpu_profile(), Some(Path::new("cpu.out")));
        assert_eq!(config.mem_profile(), Some(Path::new("mem.out")));
        assert!(config.trace_profile().is_none());
        assert_eq!(config.cpu_frequency(), DEFAULT_CPU_FREQUENCY);
        assert!(!config.is_disabled());
    }
}
