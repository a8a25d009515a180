//! Record decoders
//!
//! A decoder turns one line of a log file into a record. Lines a decoder
//! cannot make sense of are reported as `None` and counted by the reader.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use logdeck_core::{FieldValue, LogFormat, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A decoded record before it is attributed to a source and offset
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Severity,
    pub message: String,
    pub fields: BTreeMap<String, FieldValue>,
}

/// Pluggable on-disk format
pub trait LogDecoder: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Decode a single line (without its trailing newline)
    fn decode(&self, line: &str) -> Option<DecodedRecord>;
}

/// Build the decoder for a configured format
pub fn decoder_for(format: LogFormat) -> Arc<dyn LogDecoder> {
    match format {
        LogFormat::Json => Arc::new(JsonLinesDecoder),
        LogFormat::Text => Arc::new(TextDecoder),
        LogFormat::Auto => Arc::new(AutoDecoder),
    }
}

const TIMESTAMP_KEYS: &[&str] = &["timestamp", "ts", "time", "@timestamp"];
const LEVEL_KEYS: &[&str] = &["level", "severity", "lvl"];
const MESSAGE_KEYS: &[&str] = &["message", "msg"];

/// One JSON object per line
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesDecoder;

impl LogDecoder for JsonLinesDecoder {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode(&self, line: &str) -> Option<DecodedRecord> {
        let Ok(Value::Object(mut obj)) = serde_json::from_str::<Value>(line) else {
            return None;
        };

        let timestamp = take_first(&mut obj, TIMESTAMP_KEYS).and_then(|v| json_timestamp(&v))?;
        let message = match take_first(&mut obj, MESSAGE_KEYS)? {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let level = match take_first(&mut obj, LEVEL_KEYS) {
            Some(Value::String(s)) => s.parse().ok()?,
            Some(Value::Number(n)) => numeric_level(n.as_u64()?)?,
            Some(_) => return None,
            None => Severity::Info,
        };

        let fields = obj
            .into_iter()
            .map(|(k, v)| (k, FieldValue::from(v)))
            .collect();

        Some(DecodedRecord {
            timestamp,
            level,
            message,
            fields,
        })
    }
}

fn take_first(obj: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|k| obj.remove(*k))
}

/// pino/bunyan style numeric levels
fn numeric_level(n: u64) -> Option<Severity> {
    match n {
        10 => Some(Severity::Trace),
        20 => Some(Severity::Debug),
        30 => Some(Severity::Info),
        40 => Some(Severity::Warn),
        50 => Some(Severity::Error),
        60 => Some(Severity::Fatal),
        _ => None,
    }
}

fn json_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Values this large are epoch milliseconds, smaller ones seconds
            if raw.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}

/// Timestamp at the start of an unbracketed text line
static LEADING_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?)\s*(.*)$",
    )
    .expect("Invalid timestamp regex")
});

/// `[2024-01-01 12:00:00] ERROR message` or `2024-01-01T12:00:00Z [warn] message`
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDecoder;

impl LogDecoder for TextDecoder {
    fn name(&self) -> &'static str {
        "text"
    }

    fn decode(&self, line: &str) -> Option<DecodedRecord> {
        let (raw_ts, rest) = if let Some(stripped) = line.strip_prefix('[') {
            let end = stripped.find(']')?;
            (&stripped[..end], &stripped[end + 1..])
        } else {
            let caps = LEADING_TIMESTAMP.captures(line)?;
            let ts = caps.get(1)?.as_str();
            let rest = caps.get(2).map_or("", |m| m.as_str());
            (ts, rest)
        };

        let timestamp = parse_timestamp(raw_ts)?;
        let (level, message) = split_level(rest);

        Some(DecodedRecord {
            timestamp,
            level,
            message: message.to_string(),
            fields: BTreeMap::new(),
        })
    }
}

/// Peel an optional level token off the front of a message.
/// Accepts `[level]` in any case, or a bare upper-case token like `WARN:`.
fn split_level(rest: &str) -> (Severity, &str) {
    let rest = rest.trim_start();

    if let Some(stripped) = rest.strip_prefix('[') {
        if let Some(end) = stripped.find(']') {
            if let Ok(level) = stripped[..end].parse() {
                return (level, stripped[end + 1..].trim_start());
            }
        }
        return (Severity::Info, rest);
    }

    let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let token = rest[..token_end].trim_end_matches(':');
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_uppercase()) {
        if let Ok(level) = token.parse() {
            return (level, rest[token_end..].trim_start());
        }
    }

    (Severity::Info, rest)
}

/// JSON for object lines, text for everything else
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDecoder;

impl LogDecoder for AutoDecoder {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn decode(&self, line: &str) -> Option<DecodedRecord> {
        if line.trim_start().starts_with('{') {
            JsonLinesDecoder.decode(line)
        } else {
            TextDecoder.decode(line)
        }
    }
}

/// Parse RFC 3339 or a naive `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim().replace(',', ".");

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(&raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}
