mod common;

use common::{read_pprof, sample_type_names};
use std::process::Command;
use tempfile::tempdir;

fn cmdprof() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cmdprof"))
}

#[test]
fn test_burn_writes_every_profile() {
    let dir = tempdir().unwrap();
    let cpu = dir.path().join("cpu.out");
    let mem = dir.path().join("mem.out");
    let trace = dir.path().join("trace.json");

    let output = cmdprof()
        .arg("--cpuprofile")
        .arg(&cpu)
        .arg("--memprofile")
        .arg(&mem)
        .arg("--traceprofile")
        .arg(&trace)
        .args(["burn", "--millis", "150", "--rounds", "8"])
        .output()
        .expect("run cmdprof");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    assert!(!read_pprof(&cpu).sample_type.is_empty());

    let heap = read_pprof(&mem);
    assert_eq!(sample_type_names(&heap)[3], "inuse_space");
    assert!(!heap.sample.is_empty());

    let parsed: serde_json::Value = serde_json::from_slice(&std::fs::read(&trace).unwrap()).unwrap();
    let events = parsed["traceEvents"].as_array().unwrap();
    assert!(events.iter().any(|e| e["name"] == "burn" && e["ph"] == "B"));
    assert!(events.iter().any(|e| e["name"] == "allocate"));
    assert!(events.iter().any(|e| e["name"] == "burn finished"));
}

#[test]
fn test_start_failure_exits_non_zero() {
    let output = cmdprof()
        .args(["--cpuprofile", "/nonexistent/dir/cpu.out", "burn", "--millis", "1"])
        .output()
        .expect("run cmdprof");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error: "), "stderr: {stderr}");
    assert!(stderr.contains("/nonexistent/dir/cpu.out"));
}

#[test]
fn test_no_flags_writes_nothing() {
    let dir = tempdir().unwrap();
    let status = cmdprof()
        .current_dir(dir.path())
        .args(["burn", "--millis", "1", "--rounds", "1"])
        .status()
        .expect("run cmdprof");

    assert!(status.success());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
