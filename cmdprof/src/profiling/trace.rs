//! Execution trace channel
//!
//! Records `tracing` spans and events while a trace is active and writes them as
//! Chrome trace JSON when the trace stops. Span enter/exit become begin/end
//! events, events become thread-scoped instant events.
//!
//! The recording layer is attached once per process. When no global subscriber
//! exists the tracer installs one; hosts that already run their own subscriber
//! add [`layer()`] to it instead.

use super::facility::{Lease, TRACER};
use super::output::create_output;
use crate::domain::{Channel, ProfilingError};
use crate::export::{ChromeTraceExporter, Phase};
use log::{debug, info};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Instant;
use tracing::field::{Field, Visit};
use tracing::span;
use tracing::{Dispatch, Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

static RECORDING: AtomicBool = AtomicBool::new(false);
static RECORDER: Mutex<Option<Recorder>> = Mutex::new(None);
static LAYER_ATTACHED: AtomicBool = AtomicBool::new(false);
static GLOBAL_INSTALL: OnceLock<bool> = OnceLock::new();
static GENERATION: AtomicU64 = AtomicU64::new(0);
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

struct Recorder {
    started: Instant,
    exporter: ChromeTraceExporter,
}

fn recorder() -> std::sync::MutexGuard<'static, Option<Recorder>> {
    RECORDER.lock().unwrap_or_else(PoisonError::into_inner)
}

fn begin_recording() {
    GENERATION.fetch_add(1, Ordering::AcqRel);
    *recorder() = Some(Recorder {
        started: Instant::now(),
        exporter: ChromeTraceExporter::new(process_name()),
    });
    RECORDING.store(true, Ordering::Release);
}

fn end_recording() -> Option<Recorder> {
    RECORDING.store(false, Ordering::Release);
    recorder().take()
}

/// Whether spans and events are currently being recorded
pub fn is_recording() -> bool {
    RECORDING.load(Ordering::Acquire)
}

fn record(phase: Phase, name: &str, target: &str, args: Option<Map<String, JsonValue>>) {
    // Thread-locals are gone during thread teardown; drop those events
    let Ok(tid) = THREAD_ID.try_with(|id| *id) else {
        return;
    };
    let mut guard = recorder();
    let Some(rec) = guard.as_mut() else {
        return;
    };
    let ts_us = rec.started.elapsed().as_secs_f64() * 1_000_000.0;
    if !rec.exporter.knows_thread(tid) {
        let thread = std::thread::current();
        let name = thread.name().map_or_else(|| format!("thread-{tid}"), str::to_string);
        rec.exporter.name_thread(tid, name);
    }
    rec.exporter.add_event(phase, name, target, tid, ts_us, args);
}

fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "process".to_string())
}

/// `tracing` layer feeding the execution tracer
pub struct ExecutionTraceLayer {
    _private: (),
}

/// Layer to compose into a host-provided subscriber
///
/// The tracer counts as attached once a subscriber holding this layer is turned
/// into a dispatcher, e.g. by `set_global_default`.
pub fn layer() -> ExecutionTraceLayer {
    ExecutionTraceLayer { _private: () }
}

/// Make sure some subscriber feeds the recorder
fn ensure_attached() -> Result<(), ProfilingError> {
    if LAYER_ATTACHED.load(Ordering::Acquire) {
        return Ok(());
    }
    let installed = *GLOBAL_INSTALL.get_or_init(|| {
        let subscriber = tracing_subscriber::registry().with(layer());
        tracing::subscriber::set_global_default(subscriber).is_ok()
    });
    if installed {
        debug!("installed global tracing subscriber for execution traces");
        Ok(())
    } else {
        Err(ProfilingError::TracerUnavailable)
    }
}

/// Span fields captured at creation, replayed on every enter
struct SpanArgs(Map<String, JsonValue>);

/// Enters of a span recorded into the current trace and not exited yet
struct OpenEnters {
    generation: u64,
    depth: usize,
}

impl<S> Layer<S> for ExecutionTraceLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_register_dispatch(&self, _subscriber: &Dispatch) {
        LAYER_ATTACHED.store(true, Ordering::Release);
    }

    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanArgs(visitor.into_args()));
        }
    }

    fn on_enter(&self, id: &span::Id, ctx: Context<'_, S>) {
        if !is_recording() {
            return;
        }
        let Some(span) = ctx.span(id) else {
            return;
        };
        let generation = GENERATION.load(Ordering::Acquire);
        let args = {
            let mut extensions = span.extensions_mut();
            match extensions.get_mut::<OpenEnters>() {
                Some(open) if open.generation == generation => open.depth += 1,
                _ => {
                    extensions.replace(OpenEnters { generation, depth: 1 });
                }
            }
            extensions.get_mut::<SpanArgs>().map(|a| a.0.clone())
        };
        record(Phase::Begin, span.name(), span.metadata().target(), args);
    }

    fn on_exit(&self, id: &span::Id, ctx: Context<'_, S>) {
        if !is_recording() {
            return;
        }
        let Some(span) = ctx.span(id) else {
            return;
        };
        // Exits of spans entered before this trace started have no begin to close
        {
            let mut extensions = span.extensions_mut();
            let generation = GENERATION.load(Ordering::Acquire);
            match extensions.get_mut::<OpenEnters>() {
                Some(open) if open.generation == generation && open.depth > 0 => open.depth -= 1,
                _ => return,
            }
        }
        record(Phase::End, span.name(), span.metadata().target(), None);
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !is_recording() {
            return;
        }
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        let name = visitor.message.take().unwrap_or_else(|| metadata.name().to_string());
        let mut args = visitor.into_args();
        args.insert("level".to_string(), JsonValue::from(metadata.level().as_str()));
        record(Phase::Instant, &name, metadata.target(), Some(args));
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, JsonValue>,
}

impl FieldVisitor {
    fn into_args(self) -> Map<String, JsonValue> {
        self.fields
    }

    fn insert(&mut self, field: &Field, value: JsonValue) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, JsonValue::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, JsonValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, JsonValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, JsonValue::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, JsonValue::from(value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.insert(field, JsonValue::from(text));
        }
    }
}

/// Stops recording if a tracer is dropped without being finished
struct Recording;

impl Drop for Recording {
    fn drop(&mut self) {
        if end_recording().is_some() {
            debug!("execution trace discarded without being written");
        }
    }
}

/// An active execution trace writing to one file
pub struct ExecutionTracer {
    path: PathBuf,
    file: File,
    recording: Recording,
    _lease: Lease,
}

impl ExecutionTracer {
    /// Open `path` and start recording
    pub fn start(path: &Path) -> Result<Self, ProfilingError> {
        let file = create_output(Channel::Trace, path)?;
        let lease = TRACER.acquire()?;
        ensure_attached()?;
        begin_recording();

        info!("execution trace recording into {}", path.display());
        Ok(Self { path: path.to_path_buf(), file, recording: Recording, _lease: lease })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop recording, then write and close the trace file
    pub fn finish(self) -> Result<(), ProfilingError> {
        let Self { path, file, recording, _lease } = self;
        let exporter = end_recording()
            .map_or_else(|| ChromeTraceExporter::new(process_name()), |rec| rec.exporter);
        drop(recording);
        debug!("execution trace holds {} events", exporter.event_count());

        let mut writer = BufWriter::new(file);
        exporter.export(&mut writer).map_err(|e| {
            if e.is_io() {
                write_error(&path, e.into())
            } else {
                ProfilingError::TraceEncode(e)
            }
        })?;
        let file = writer
            .into_inner()
            .map_err(|e| write_error(&path, e.into_error()))?;
        file.sync_all().map_err(|e| write_error(&path, e))?;

        info!("execution trace written to {}", path.display());
        Ok(())
    }
}

fn write_error(path: &Path, source: std::io::Error) -> ProfilingError {
    ProfilingError::WriteOutput { channel: Channel::Trace, path: path.to_path_buf(), source }
}
