use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::io::Write;

/// Event phase as understood by trace viewers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Begin,
    End,
    Instant,
}

impl Phase {
    fn code(self) -> &'static str {
        match self {
            Phase::Begin => "B",
            Phase::End => "E",
            Phase::Instant => "i",
        }
    }
}

/// Chrome Trace Event format
/// Spec: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChromeTraceEvent {
    /// Event name (span name or event message)
    name: String,
    /// Category for filtering/coloring (the tracing target)
    cat: String,
    /// Phase: "B" = begin, "E" = end, "i" = instant, "M" = metadata
    ph: String,
    /// Timestamp in microseconds
    ts: f64,
    /// Process ID
    pid: u32,
    /// Thread ID
    tid: u64,
    /// Instant event scope ("t" = thread)
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<String>,
    /// Optional arguments (metadata)
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Map<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace<'a> {
    #[serde(rename = "traceEvents")]
    trace_events: &'a [ChromeTraceEvent],
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: &'static str,
}

/// Chrome trace exporter for timeline visualization
pub struct ChromeTraceExporter {
    /// Collected trace events
    events: Vec<ChromeTraceEvent>,
    /// Thread names by trace thread id
    threads: BTreeMap<u64, String>,
    /// Process name shown by the viewer
    process_name: String,
    pid: u32,
}

impl ChromeTraceExporter {
    /// Create a new Chrome trace exporter for the current process
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            threads: BTreeMap::new(),
            process_name: process_name.into(),
            pid: std::process::id(),
        }
    }

    pub fn knows_thread(&self, tid: u64) -> bool {
        self.threads.contains_key(&tid)
    }

    /// Remember a thread's display name (first name wins)
    pub fn name_thread(&mut self, tid: u64, name: impl Into<String>) {
        self.threads.entry(tid).or_insert_with(|| name.into());
    }

    /// Add an event
    ///
    /// `ts_us` is in microseconds relative to the start of the trace.
    pub fn add_event(
        &mut self,
        phase: Phase,
        name: impl Into<String>,
        category: impl Into<String>,
        tid: u64,
        ts_us: f64,
        args: Option<Map<String, JsonValue>>,
    ) {
        self.events.push(ChromeTraceEvent {
            name: name.into(),
            cat: category.into(),
            ph: phase.code().to_string(),
            ts: ts_us,
            pid: self.pid,
            tid,
            s: (phase == Phase::Instant).then(|| "t".to_string()),
            args: args.filter(|a| !a.is_empty()),
        });
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    ///
    /// # Example
    /// ```
    /// use cmdprof::export::{ChromeTraceExporter, Phase};
    ///
    /// let mut exporter = ChromeTraceExporter::new("demo");
    /// exporter.add_event(Phase::Begin, "work", "demo", 1, 0.0, None);
    /// exporter.add_event(Phase::End, "work", "demo", 1, 12.5, None);
    ///
    /// let mut buffer = Vec::new();
    /// exporter.export(&mut buffer).unwrap();
    /// ```
    pub fn export<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        let mut all_events = self.events.clone();

        let mut args = Map::new();
        args.insert("name".to_string(), serde_json::json!(self.process_name));
        all_events.push(self.metadata("process_name", 0, args));

        // Generate thread name metadata events
        for (tid, name) in &self.threads {
            let mut args = Map::new();
            args.insert("name".to_string(), serde_json::json!(name));
            all_events.push(self.metadata("thread_name", *tid, args));
        }

        let trace = ChromeTrace { trace_events: &all_events, display_time_unit: "ms" };
        serde_json::to_writer(writer, &trace)
    }

    fn metadata(&self, name: &str, tid: u64, args: Map<String, JsonValue>) -> ChromeTraceEvent {
        ChromeTraceEvent {
            name: name.to_string(),
            cat: String::new(),
            ph: "M".to_string(),
            ts: 0.0,
            pid: self.pid,
            tid,
            s: None,
            args: Some(args),
        }
    }

    /// Get the number of events collected
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exported(exporter: &ChromeTraceExporter) -> serde_json::Value {
        let mut buffer = Vec::new();
        exporter.export(&mut buffer).unwrap();
        serde_json::from_slice(&buffer).unwrap()
    }

    #[test]
    fn test_export_creates_valid_json() {
        let exporter = ChromeTraceExporter::new("cmdprof");
        let parsed = exported(&exporter);

        assert!(parsed.get("traceEvents").is_some());
        assert_eq!(parsed["displayTimeUnit"], "ms");
        assert_eq!(parsed["traceEvents"][0]["name"], "process_name");
        assert_eq!(parsed["traceEvents"][0]["args"]["name"], "cmdprof");
    }

    #[test]
    fn test_thread_names_become_metadata() {
        let mut exporter = ChromeTraceExporter::new("cmdprof");
        exporter.name_thread(3, "worker");
        exporter.name_thread(3, "renamed");
        exporter.add_event(Phase::Instant, "tick", "app", 3, 1.0, Some(Map::new()));

        let parsed = exported(&exporter);
        let events = parsed["traceEvents"].as_array().unwrap();
        assert_eq!(exporter.event_count(), 1);
        assert_eq!(events[0]["ph"], "i");
        assert_eq!(events[0]["s"], "t");
        assert!(events[0].get("args").is_none());

        let thread = events.iter().find(|e| e["name"] == "thread_name").unwrap();
        assert_eq!(thread["tid"], 3);
        assert_eq!(thread["args"]["name"], "worker");
    }
}
