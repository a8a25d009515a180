#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use logdeck_core::{LogFormat, SourceConfig, StreamConfig};
use logdeck_query::{EngineConfig, LogQueryEngine, SourceRegistry};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
}

pub fn json_line(secs: i64, level: &str, msg: &str) -> String {
    format!(
        "{{\"ts\":\"{}\",\"level\":\"{}\",\"msg\":\"{}\"}}\n",
        at(secs).to_rfc3339(),
        level,
        msg
    )
}

pub fn append(path: &Path, lines: &[String]) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for line in lines {
        file.write_all(line.as_bytes()).unwrap();
    }
    file.flush().unwrap();
}

/// `count` info entries, one second apart starting at `first_sec`
pub fn seed(dir: &TempDir, name: &str, first_sec: i64, count: usize) -> PathBuf {
    let path = dir.path().join(format!("{}.log", name));
    let lines: Vec<String> = (0..count as i64)
        .map(|i| json_line(first_sec + i, "info", &format!("{} {}", name, first_sec + i)))
        .collect();
    append(&path, &lines);
    path
}

pub fn engine(dir: &TempDir) -> LogQueryEngine {
    engine_with(dir, EngineConfig::default())
}

pub fn engine_with(dir: &TempDir, config: EngineConfig) -> LogQueryEngine {
    let registry = SourceRegistry::new(
        vec![],
        Some(dir.path().to_path_buf()),
        "*.log",
        LogFormat::Auto,
    )
    .unwrap();
    LogQueryEngine::new(registry, config)
}

/// Engine over explicitly configured `<name>.log` files only
pub fn explicit_engine(dir: &TempDir, names: &[&str]) -> LogQueryEngine {
    explicit_engine_with(dir, names, EngineConfig::default())
}

pub fn explicit_engine_with(dir: &TempDir, names: &[&str], config: EngineConfig) -> LogQueryEngine {
    let sources = names
        .iter()
        .map(|name| SourceConfig {
            id: name.to_string(),
            path: dir.path().join(format!("{}.log", name)),
            format: Some(LogFormat::Json),
        })
        .collect();
    let registry = SourceRegistry::new(sources, None, "*.log", LogFormat::Auto).unwrap();
    LogQueryEngine::new(registry, config)
}

pub fn fast_stream() -> EngineConfig {
    EngineConfig {
        stream: StreamConfig {
            window_ms: 30,
            poll_ms: 20,
            channel_capacity: 64,
        },
        ..Default::default()
    }
}
