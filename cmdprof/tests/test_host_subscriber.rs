//! A host that runs its own subscriber composes the trace layer into it

mod common;

use cmdprof::profiling::trace;
use cmdprof::{ProfilingConfig, ProfilingSession};
use common::spin;
use tempfile::tempdir;
use tracing_subscriber::prelude::*;

#[test]
fn test_trace_recorded_through_host_subscriber() {
    let subscriber = tracing_subscriber::registry().with(trace::layer());
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.json");
    let mut session = ProfilingSession::new(ProfilingConfig::new().with_trace_profile(&path));
    session.start().unwrap();
    tracing::info_span!("host_work", step = 1u64).in_scope(|| {
        spin(1);
        tracing::info!("host event");
    });
    session.stop().unwrap();

    let trace: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let events = trace["traceEvents"].as_array().unwrap();
    let begin = events
        .iter()
        .find(|e| e["name"] == "host_work" && e["ph"] == "B")
        .expect("span begin recorded");
    assert_eq!(begin["args"]["step"], 1);
    assert!(events.iter().any(|e| e["name"] == "host_work" && e["ph"] == "E"));
    assert!(events.iter().any(|e| e["name"] == "host event" && e["ph"] == "i"));
}
