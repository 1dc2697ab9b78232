//! Helpers shared by the integration tests

#![allow(dead_code)]

use flate2::read::GzDecoder;
use pprof::protos::{Message, Profile};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The CPU sampler and tracer are process-wide; tests touching them take this lock
static SERIAL: Mutex<()> = Mutex::new(());

pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decode a gzip-compressed pprof file
pub fn read_pprof(path: &Path) -> Profile {
    let compressed = std::fs::read(path).expect("profile file exists");
    assert!(!compressed.is_empty(), "{} is empty", path.display());
    decode_pprof(&compressed)
}

pub fn decode_pprof(compressed: &[u8]) -> Profile {
    let mut raw = Vec::new();
    GzDecoder::new(compressed).read_to_end(&mut raw).expect("gzip stream");
    Profile::decode(&raw[..]).expect("profile.proto")
}

pub fn sample_type_names(profile: &Profile) -> Vec<String> {
    profile
        .sample_type
        .iter()
        .map(|vt| profile.string_table[usize::try_from(vt.ty).unwrap()].clone())
        .collect()
}

/// Minimal HTTP/1.1 GET returning status code and body
pub fn http_get(addr: SocketAddr, path: &str) -> (u16, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).expect("connect to debug endpoint");
    write!(stream, "GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n").unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).unwrap();

    let split = raw.windows(4).position(|w| w == b"\r\n\r\n").expect("header terminator");
    let head = String::from_utf8_lossy(&raw[..split]).into_owned();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status code");
    (status, raw[split + 4..].to_vec())
}

/// Keep the CPU busy long enough for a few samples
pub fn spin(millis: u64) -> u64 {
    let started = std::time::Instant::now();
    let mut acc = 1u64;
    while started.elapsed().as_millis() < u128::from(millis) {
        acc = std::hint::black_box(acc.wrapping_mul(31).wrapping_add(7));
    }
    acc
}
