//! Heap accounting and heap snapshots
//!
//! Rust has no runtime heap profiler, so allocations are counted by
//! [`TrackingAllocator`], a [`GlobalAlloc`] wrapper the host installs:
//!
//! ```no_run
//! use cmdprof::profiling::heap::TrackingAllocator;
//! use std::alloc::System;
//!
//! #[global_allocator]
//! static ALLOC: TrackingAllocator<System> = TrackingAllocator::new(System);
//!
//! fn main() {}
//! ```
//!
//! A snapshot reads the counters and encodes them as a pprof heap profile with one
//! sample per power-of-two size class.

#![allow(unsafe_code)] // GlobalAlloc is an unsafe trait

use super::output::{create_output, gzip_into, write_pprof};
use crate::domain::{Channel, ProfilingError};
use log::{info, warn};
use pprof::protos::{Label, Message, Profile, Sample, ValueType};
use serde::Serialize;
use std::alloc::{GlobalAlloc, Layout};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Size classes: class `i` holds allocations of at most `2^i` bytes, the last one everything bigger
const SIZE_CLASSES: usize = 41;

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU64 = AtomicU64::new(0);

static ALLOC_COUNT: [AtomicU64; SIZE_CLASSES] = [ZERO; SIZE_CLASSES];
static ALLOC_BYTES: [AtomicU64; SIZE_CLASSES] = [ZERO; SIZE_CLASSES];
static FREE_COUNT: [AtomicU64; SIZE_CLASSES] = [ZERO; SIZE_CLASSES];
static FREE_BYTES: [AtomicU64; SIZE_CLASSES] = [ZERO; SIZE_CLASSES];

static TRACKING: AtomicBool = AtomicBool::new(false);

/// Global allocator wrapper that counts allocations per size class
pub struct TrackingAllocator<A> {
    inner: A,
}

impl<A> TrackingAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

fn size_class(size: usize) -> usize {
    let class = size.max(1).next_power_of_two().trailing_zeros() as usize;
    class.min(SIZE_CLASSES - 1)
}

fn record_alloc(size: usize) {
    let class = size_class(size);
    ALLOC_COUNT[class].fetch_add(1, Ordering::Relaxed);
    ALLOC_BYTES[class].fetch_add(size as u64, Ordering::Relaxed);
    if !TRACKING.load(Ordering::Relaxed) {
        TRACKING.store(true, Ordering::Relaxed);
    }
}

fn record_free(size: usize) {
    let class = size_class(size);
    FREE_COUNT[class].fetch_add(1, Ordering::Relaxed);
    FREE_BYTES[class].fetch_add(size as u64, Ordering::Relaxed);
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
        record_free(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            record_free(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}

/// Whether a [`TrackingAllocator`] has seen any allocation in this process
pub fn is_tracking() -> bool {
    TRACKING.load(Ordering::Relaxed)
}

/// Counters of one size class at snapshot time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SizeClassStats {
    /// Upper bound of allocation sizes in this class, in bytes
    pub max_size: u64,
    pub alloc_objects: u64,
    pub alloc_bytes: u64,
    pub free_objects: u64,
    pub free_bytes: u64,
}

impl SizeClassStats {
    pub fn inuse_objects(&self) -> u64 {
        self.alloc_objects.saturating_sub(self.free_objects)
    }

    pub fn inuse_bytes(&self) -> u64 {
        self.alloc_bytes.saturating_sub(self.free_bytes)
    }
}

/// Totals over all size classes, served as `memstats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeapTotals {
    pub alloc_objects: u64,
    pub alloc_bytes: u64,
    pub free_objects: u64,
    pub free_bytes: u64,
    pub inuse_objects: u64,
    pub inuse_bytes: u64,
}

/// Point-in-time copy of the allocation counters
#[derive(Debug, Clone)]
pub struct HeapSnapshot {
    classes: Vec<SizeClassStats>,
    time_nanos: i64,
}

impl HeapSnapshot {
    /// Read the current counters
    pub fn capture() -> Self {
        let classes = (0..SIZE_CLASSES)
            .map(|class| SizeClassStats {
                max_size: if class == SIZE_CLASSES - 1 { u64::MAX } else { 1 << class },
                alloc_objects: ALLOC_COUNT[class].load(Ordering::Relaxed),
                alloc_bytes: ALLOC_BYTES[class].load(Ordering::Relaxed),
                free_objects: FREE_COUNT[class].load(Ordering::Relaxed),
                free_bytes: FREE_BYTES[class].load(Ordering::Relaxed),
            })
            .collect();
        let time_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX));
        Self { classes, time_nanos }
    }

    /// Size classes that have seen at least one allocation
    pub fn classes(&self) -> impl Iterator<Item = &SizeClassStats> {
        self.classes.iter().filter(|c| c.alloc_objects > 0)
    }

    pub fn totals(&self) -> HeapTotals {
        self.classes().fold(HeapTotals::default(), |mut t, c| {
            t.alloc_objects += c.alloc_objects;
            t.alloc_bytes += c.alloc_bytes;
            t.free_objects += c.free_objects;
            t.free_bytes += c.free_bytes;
            t.inuse_objects += c.inuse_objects();
            t.inuse_bytes += c.inuse_bytes();
            t
        })
    }

    /// Encode as a pprof heap profile
    ///
    /// Sample types follow the Go heap profile layout so standard tooling picks
    /// `inuse_space` by default.
    pub fn to_pprof(&self) -> Profile {
        let mut strings = StringTable::default();

        let sample_type = [
            ("alloc_objects", "count"),
            ("alloc_space", "bytes"),
            ("inuse_objects", "count"),
            ("inuse_space", "bytes"),
        ]
        .iter()
        .map(|(ty, unit)| ValueType { ty: strings.intern(ty), unit: strings.intern(unit) })
        .collect();

        let bytes_key = strings.intern("bytes");
        let sample = self
            .classes()
            .map(|c| Sample {
                location_id: Vec::new(),
                value: vec![
                    saturating_i64(c.alloc_objects),
                    saturating_i64(c.alloc_bytes),
                    saturating_i64(c.inuse_objects()),
                    saturating_i64(c.inuse_bytes()),
                ],
                label: vec![Label {
                    key: bytes_key,
                    num: saturating_i64(c.max_size),
                    num_unit: bytes_key,
                    ..Label::default()
                }],
            })
            .collect();

        let period_type = ValueType { ty: strings.intern("space"), unit: bytes_key };
        let default_sample_type = strings.intern("inuse_space");

        Profile {
            sample_type,
            sample,
            time_nanos: self.time_nanos,
            period_type: Some(period_type),
            period: 1,
            default_sample_type,
            string_table: strings.into_inner(),
            ..Profile::default()
        }
    }

    /// Gzip-compressed `profile.proto` bytes, as served by the debug endpoint
    pub fn to_gzipped_pprof(&self) -> std::io::Result<Vec<u8>> {
        gzip_into(Vec::new(), &self.to_pprof().encode_to_vec())
    }
}

/// Write a heap snapshot to `path`, creating or truncating it
pub fn write_profile(path: &Path) -> Result<(), ProfilingError> {
    let file = create_output(Channel::Heap, path)?;
    if !is_tracking() {
        warn!("heap profile requested but no TrackingAllocator is installed; counters are empty");
    }
    let snapshot = HeapSnapshot::capture();
    write_pprof(Channel::Heap, path, file, &snapshot.to_pprof())?;

    let totals = snapshot.totals();
    info!(
        "heap profile written to {} ({} objects, {} bytes in use)",
        path.display(),
        totals.inuse_objects,
        totals.inuse_bytes
    );
    Ok(())
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// pprof string table; index 0 is always the empty string
struct StringTable {
    strings: Vec<String>,
}

impl Default for StringTable {
    fn default() -> Self {
        Self { strings: vec![String::new()] }
    }
}

impl StringTable {
    fn intern(&mut self, s: &str) -> i64 {
        let index = match self.strings.iter().position(|existing| existing == s) {
            Some(index) => index,
            None => {
                self.strings.push(s.to_string());
                self.strings.len() - 1
            }
        };
        i64::try_from(index).unwrap_or(i64::MAX)
    }

    fn into_inner(self) -> Vec<String> {
        self.strings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_class_boundaries() {
        assert_eq!(size_class(0), 0);
        assert_eq!(size_class(1), 0);
        assert_eq!(size_class(2), 1);
        assert_eq!(size_class(3), 2);
        assert_eq!(size_class(4096), 12);
        assert_eq!(size_class(4097), 13);
        assert_eq!(size_class(usize::MAX / 2), SIZE_CLASSES - 1);
    }

    #[test]
    fn test_inuse_never_underflows() {
        let stats = SizeClassStats {
            max_size: 8,
            alloc_objects: 1,
            alloc_bytes: 8,
            free_objects: 3,
            free_bytes: 24,
        };
        assert_eq!(stats.inuse_objects(), 0);
        assert_eq!(stats.inuse_bytes(), 0);
    }

    #[test]
    fn test_string_table_interns_once() {
        let mut table = StringTable::default();
        let a = table.intern("bytes");
        let b = table.intern("count");
        assert_eq!(table.intern("bytes"), a);
        assert_ne!(a, b);
        assert_eq!(table.intern(""), 0);
        assert_eq!(table.into_inner().len(), 3);
    }

    #[test]
    fn test_profile_declares_heap_sample_types() {
        let profile = HeapSnapshot::capture().to_pprof();
        let names: Vec<&str> = profile
            .sample_type
            .iter()
            .map(|vt| profile.string_table[usize::try_from(vt.ty).unwrap()].as_str())
            .collect();
        assert_eq!(names, ["alloc_objects", "alloc_space", "inuse_objects", "inuse_space"]);
        assert_eq!(
            profile.string_table[usize::try_from(profile.default_sample_type).unwrap()],
            "inuse_space"
        );
        assert!(!profile.encode_to_vec().is_empty());
    }
}
