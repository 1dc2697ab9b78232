//! CPU sampling channel
//!
//! Wraps the process-wide `pprof` sampler. The destination file is opened before
//! sampling begins and only written when the sampler is finished.

use super::facility::{Lease, CPU_SAMPLER};
use super::output::{create_output, write_pprof};
use crate::domain::{Channel, ProfilingError};
use log::{debug, info};
use pprof::{ProfilerGuard, ProfilerGuardBuilder};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Frames from these libraries are dropped from samples
const BLOCKLIST: &[&str] = &["libc", "libgcc", "pthread", "vdso"];

/// An active CPU sampling session writing to one file
pub struct CpuSampler {
    path: PathBuf,
    file: File,
    guard: ProfilerGuard<'static>,
    _lease: Lease,
}

impl CpuSampler {
    /// Open `path` and start sampling at `frequency` Hz
    pub fn start(path: &Path, frequency: i32) -> Result<Self, ProfilingError> {
        let file = create_output(Channel::Cpu, path)?;
        let lease = CPU_SAMPLER.acquire()?;
        let guard = ProfilerGuardBuilder::default()
            .frequency(frequency)
            .blocklist(BLOCKLIST)
            .build()?;

        info!("CPU profiling at {frequency} Hz into {}", path.display());
        Ok(Self { path: path.to_path_buf(), file, guard, _lease: lease })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop sampling and write the profile
    ///
    /// The sampler and its lease are released even when building or writing fails.
    pub fn finish(self) -> Result<(), ProfilingError> {
        let Self { path, file, guard, _lease } = self;

        let report = guard.report().build();
        drop(guard);
        let profile = report?.pprof()?;
        debug!("CPU profile holds {} samples", profile.sample.len());

        write_pprof(Channel::Cpu, &path, file, &profile)?;
        info!("CPU profile written to {}", path.display());
        Ok(())
    }
}
