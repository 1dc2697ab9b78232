//! Exclusive ownership of process-wide instrumentation
//!
//! The CPU sampler and the execution tracer can each only run once per process.
//! A session acquires a [`Lease`] before touching either; the lease is released
//! when dropped.

use crate::domain::{Channel, ProfilingError};
use std::sync::atomic::{AtomicBool, Ordering};

/// A process-wide singleton resource
pub struct Facility {
    channel: Channel,
    held: AtomicBool,
}

/// The CPU sampling timer and signal handler
pub static CPU_SAMPLER: Facility = Facility::new(Channel::Cpu);

/// The execution trace recorder
pub static TRACER: Facility = Facility::new(Channel::Trace);

impl Facility {
    const fn new(channel: Channel) -> Self {
        Self { channel, held: AtomicBool::new(false) }
    }

    /// Take exclusive ownership, failing if another holder exists
    pub fn acquire(&'static self) -> Result<Lease, ProfilingError> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ProfilingError::AlreadyActive(self.channel))?;
        Ok(Lease { facility: self })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof of exclusive ownership of a [`Facility`]
#[must_use = "the facility is released as soon as the lease is dropped"]
pub struct Lease {
    facility: &'static Facility,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.facility.held.store(false, Ordering::Release);
    }
}
