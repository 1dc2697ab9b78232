//! Published debug variables
//!
//! Variables live in a process-wide [`Registry`] and are rendered together as one
//! JSON object. Two names are built in and always present: `cmdline` (process
//! arguments) and `memstats` (allocator counters and resident set size).

use crate::domain::VarError;
use crate::profiling::heap::{self, HeapSnapshot};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

const RESERVED: &[&str] = &["cmdline", "memstats"];

type VarFn = dyn Fn() -> JsonValue + Send + Sync;

/// A published variable
#[derive(Clone)]
pub enum Var {
    Int(Int),
    Text(Text),
    Func(Arc<VarFn>),
}

impl Var {
    pub fn value(&self) -> JsonValue {
        match self {
            Var::Int(int) => JsonValue::from(int.value()),
            Var::Text(text) => JsonValue::from(text.value()),
            Var::Func(func) => func(),
        }
    }
}

/// Integer variable, cheap to clone and update from any thread
#[derive(Clone, Default)]
pub struct Int(Arc<AtomicI64>);

impl Int {
    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// String variable
#[derive(Clone, Default)]
pub struct Text(Arc<RwLock<String>>);

impl Text {
    pub fn set(&self, value: impl Into<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = value.into();
    }

    pub fn value(&self) -> String {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Named variables exposed on `/debug/vars`
#[derive(Default)]
pub struct Registry {
    vars: RwLock<BTreeMap<String, Var>>,
}

/// The process-wide registry served by the debug endpoint
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::default)
}

impl Registry {
    /// Publish `var` under `name`; names are unique for the registry's lifetime
    pub fn publish(&self, name: impl Into<String>, var: Var) -> Result<(), VarError> {
        let name = name.into();
        if RESERVED.contains(&name.as_str()) {
            return Err(VarError::Reserved(name));
        }
        let mut vars = self.vars.write().unwrap_or_else(PoisonError::into_inner);
        if vars.contains_key(&name) {
            return Err(VarError::Duplicate(name));
        }
        vars.insert(name, var);
        Ok(())
    }

    pub fn new_int(&self, name: impl Into<String>) -> Result<Int, VarError> {
        let int = Int::default();
        self.publish(name, Var::Int(int.clone()))?;
        Ok(int)
    }

    pub fn new_text(&self, name: impl Into<String>) -> Result<Text, VarError> {
        let text = Text::default();
        self.publish(name, Var::Text(text.clone()))?;
        Ok(text)
    }

    /// Publish a value computed on every read
    pub fn publish_func<F>(&self, name: impl Into<String>, func: F) -> Result<(), VarError>
    where
        F: Fn() -> JsonValue + Send + Sync + 'static,
    {
        self.publish(name, Var::Func(Arc::new(func)))
    }

    pub fn get(&self, name: &str) -> Option<Var> {
        self.vars.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// All variables, built-ins included, as one JSON object
    pub fn render(&self) -> JsonValue {
        let mut out = Map::new();
        out.insert("cmdline".to_string(), cmdline());
        out.insert("memstats".to_string(), memstats());
        let vars = self.vars.read().unwrap_or_else(PoisonError::into_inner);
        for (name, var) in vars.iter() {
            out.insert(name.clone(), var.value());
        }
        JsonValue::Object(out)
    }
}

fn cmdline() -> JsonValue {
    JsonValue::from(std::env::args().collect::<Vec<_>>())
}

fn memstats() -> JsonValue {
    let totals = HeapSnapshot::capture().totals();
    json!({
        "tracking": heap::is_tracking(),
        "heap": totals,
        "rss_bytes": rss_bytes(),
    })
}

/// Resident set size from the OS, 0 when unavailable
#[cfg(target_os = "linux")]
fn rss_bytes() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| parse_vm_rss(&status))
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn rss_bytes() -> u64 {
    0
}

/// `VmRSS` from `/proc/<pid>/status`, reported in kB regardless of page size
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    let value = status.lines().find_map(|line| line.strip_prefix("VmRSS:"))?;
    let kib = value.split_whitespace().next()?.parse::<u64>().ok()?;
    Some(kib * 1024)
}
