//! Profiling session lifecycle
//!
//! A [`ProfilingSession`] is driven by two hooks around a unit of work:
//! [`start`](ProfilingSession::start) before it and [`stop`](ProfilingSession::stop)
//! after it.
//!
//! `start` enables channels in a fixed order and returns at the first failure:
//!
//! 1. debug endpoint (detached, failures never returned)
//! 2. CPU sampler
//! 3. execution tracer
//!
//! Channels enabled before a failure stay running and owned by the session
//! unless rollback was configured, so a later `stop` still finalizes them.
//!
//! `stop` finishes the CPU sampler, writes the heap snapshot, then finishes the
//! tracer. Every step runs even if an earlier one failed. The heap snapshot only
//! depends on configuration, not on whether `start` ran.

use crate::config::ProfilingConfig;
use crate::debug::DebugEndpoint;
use crate::domain::ProfilingError;
use crate::profiling::{heap, CpuSampler, ExecutionTracer};
use log::{debug, info, warn};

pub struct ProfilingSession {
    config: ProfilingConfig,
    cpu: Option<CpuSampler>,
    tracer: Option<ExecutionTracer>,
    debug_endpoint: Option<DebugEndpoint>,
}

impl ProfilingSession {
    pub fn new(config: ProfilingConfig) -> Self {
        Self { config, cpu: None, tracer: None, debug_endpoint: None }
    }

    /// "Before" hook: enable every configured channel
    ///
    /// Channels this session already runs are left alone, so a repeated `start`
    /// never truncates a live profile.
    pub fn start(&mut self) -> Result<(), ProfilingError> {
        if self.config.is_disabled() {
            debug!("no profiling channel configured");
            return Ok(());
        }

        if let Some(bind) = self.config.expvar_bind() {
            if self.debug_endpoint.is_none() {
                debug!("starting debug endpoint on {bind}");
                self.debug_endpoint = Some(DebugEndpoint::spawn(bind));
            }
        }

        if let Err(e) = self.start_exclusive_channels() {
            if self.config.rollback_on_failure() {
                self.rollback();
            }
            return Err(e);
        }
        Ok(())
    }

    fn start_exclusive_channels(&mut self) -> Result<(), ProfilingError> {
        if self.cpu.is_none() {
            if let Some(path) = self.config.cpu_profile() {
                let sampler = CpuSampler::start(path, self.config.cpu_frequency())?;
                self.cpu = Some(sampler);
            }
        }

        if self.tracer.is_none() {
            if let Some(path) = self.config.trace_profile() {
                let tracer = ExecutionTracer::start(path)?;
                self.tracer = Some(tracer);
            }
        }

        Ok(())
    }

    /// Drop channels enabled by a failed start without writing their output
    fn rollback(&mut self) {
        if let Some(sampler) = self.cpu.take() {
            warn!("rolling back CPU profile {}", sampler.path().display());
        }
        if let Some(tracer) = self.tracer.take() {
            warn!("rolling back execution trace {}", tracer.path().display());
        }
    }

    /// "After" hook: flush and close every file-backed channel
    pub fn stop(&mut self) -> Result<(), ProfilingError> {
        let mut errors = Vec::new();

        if let Some(sampler) = self.cpu.take() {
            if let Err(e) = sampler.finish() {
                errors.push(e);
            }
        }

        if let Some(path) = self.config.mem_profile() {
            if let Err(e) = heap::write_profile(path) {
                errors.push(e);
            }
        }

        if let Some(tracer) = self.tracer.take() {
            if let Err(e) = tracer.finish() {
                errors.push(e);
            }
        }

        for e in errors.iter().skip(1) {
            match e.channel() {
                Some(channel) => warn!("{channel} teardown failed: {e}"),
                None => warn!("profiling teardown failed: {e}"),
            }
        }
        ProfilingError::collect(errors)
    }

    /// Run `work` between the two hooks
    ///
    /// `stop` only runs when `work` succeeds; a failing command aborts without
    /// writing profiles, matching how the hooks are wired around a root command.
    pub fn run<T>(&mut self, work: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
        self.start()?;
        let output = work()?;
        self.stop()?;
        Ok(output)
    }

    pub fn is_cpu_profiling(&self) -> bool {
        self.cpu.is_some()
    }

    pub fn is_tracing(&self) -> bool {
        self.tracer.is_some()
    }

    /// The detached debug listener, if one was started
    pub fn debug_endpoint(&self) -> Option<&DebugEndpoint> {
        self.debug_endpoint.as_ref()
    }
}

impl Drop for ProfilingSession {
    fn drop(&mut self) {
        if self.cpu.is_some() || self.tracer.is_some() {
            info!("profiling session dropped before stop; discarding unwritten profiles");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_session_is_a_no_op() {
        let mut session = ProfilingSession::new(ProfilingConfig::default());
        session.start().unwrap();
        assert!(!session.is_cpu_profiling());
        assert!(!session.is_tracing());
        assert!(session.debug_endpoint().is_none());
        session.stop().unwrap();
    }

    #[test]
    fn test_run_returns_work_output() {
        let mut session = ProfilingSession::new(ProfilingConfig::default());
        let value = session.run(|| Ok(41 + 1)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_run_propagates_work_error() {
        let mut session = ProfilingSession::new(ProfilingConfig::default());
        let err = session.run(|| -> anyhow::Result<()> { anyhow::bail!("command failed") });
        assert_eq!(err.unwrap_err().to_string(), "command failed");
    }
}
