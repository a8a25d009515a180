//! Core types for LogDeck

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::*;
use crate::cursor::Cursor;
use crate::error::{Error, Result};

/// Log severity, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" | "trc" => Ok(Severity::Trace),
            "debug" | "dbg" => Ok(Severity::Debug),
            "info" | "inf" | "notice" => Ok(Severity::Info),
            "warn" | "warning" | "wrn" => Ok(Severity::Warn),
            "error" | "err" => Ok(Severity::Error),
            "fatal" | "critical" | "crit" | "panic" => Ok(Severity::Fatal),
            _ => Err(Error::bad_request(format!("Unknown severity: {}", s))),
        }
    }
}

/// Primitive value of a structured field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::Str(s),
            // Nested values are kept as their JSON text
            other => FieldValue::Str(other.to_string()),
        }
    }
}

/// A single decoded log record. Immutable once read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: Severity,
    /// Id of the source that produced this entry
    pub source: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldValue>,
    /// Byte offset of the record within its source file
    pub offset: u64,
}

impl LogEntry {
    /// Total order used when merging sources: timestamp, then source id, then offset
    pub fn merge_cmp(&self, other: &LogEntry) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.source.cmp(&other.source))
            .then_with(|| self.offset.cmp(&other.offset))
    }
}

/// Chronological direction of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Apply this direction to an ascending comparison
    pub fn apply(&self, ord: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            _ => Err(Error::bad_request(format!("Invalid sort order: {}", s))),
        }
    }
}

/// Inclusive time window; either bound may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| *ts >= from) && self.to.map_or(true, |to| *ts <= to)
    }
}

/// A filter + pagination request against one or more sources
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    /// Minimum severity (inclusive)
    pub min_level: Option<Severity>,
    /// Restrict to these source ids; `None` means all sources
    pub sources: Option<Vec<String>>,
    /// Case-insensitive substring of the message
    pub text: Option<String>,
    pub time: TimeRange,
    pub cursor: Option<Cursor>,
    pub page_size: usize,
    pub order: SortOrder,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            min_level: None,
            sources: None,
            text: None,
            time: TimeRange::default(),
            cursor: None,
            page_size: DEFAULT_PAGE_SIZE,
            order: SortOrder::Asc,
        }
    }
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_level(mut self, level: Severity) -> Self {
        self.min_level = Some(level);
        self
    }

    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_time(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.time = TimeRange { from, to };
        self
    }

    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Reject specs that cannot be executed
    pub fn validate(&self, max_page_size: usize) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::bad_request("pageSize must be at least 1"));
        }
        if self.page_size > max_page_size {
            return Err(Error::bad_request(format!(
                "pageSize must be at most {}",
                max_page_size
            )));
        }
        if let (Some(from), Some(to)) = (self.time.from, self.time.to) {
            if from > to {
                return Err(Error::bad_request("'from' must not be after 'to'"));
            }
        }
        if let Some(sources) = &self.sources {
            if sources.is_empty() {
                return Err(Error::bad_request("source list is empty"));
            }
        }
        if let Some(cursor) = &self.cursor {
            if cursor.order != self.order {
                return Err(Error::InvalidCursor(
                    "cursor was issued for a different sort order".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Severity, text and time predicate. Source membership is resolved by the engine.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(min) = self.min_level {
            if entry.level < min {
                return false;
            }
        }

        if !self.time.contains(&entry.timestamp) {
            return false;
        }

        if let Some(ref text) = self.text {
            if !entry.message.to_lowercase().contains(&text.to_lowercase()) {
                return false;
            }
        }

        true
    }

    /// True once an entry lies beyond the time range in scan direction,
    /// so later entries from the same source cannot match either
    pub fn is_past_range(&self, entry: &LogEntry) -> bool {
        match self.order {
            SortOrder::Asc => self.time.to.map_or(false, |to| entry.timestamp > to),
            SortOrder::Desc => self.time.from.map_or(false, |from| entry.timestamp < from),
        }
    }
}

/// Why a source could not contribute to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    NotFound,
    PermissionDenied,
    StreamReset,
    Io,
}

/// Per-source failure annotation on a partial result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub source: String,
    pub kind: SourceErrorKind,
    pub message: String,
}

impl SourceError {
    pub fn new(source: impl Into<String>, err: &Error) -> Self {
        let kind = match err {
            Error::SourceNotFound(_) | Error::FileNotFound(_) => SourceErrorKind::NotFound,
            Error::PermissionDenied(_) => SourceErrorKind::PermissionDenied,
            Error::StreamReset { .. } => SourceErrorKind::StreamReset,
            _ => SourceErrorKind::Io,
        };
        Self {
            source: source.into(),
            kind,
            message: err.to_string(),
        }
    }
}

/// One page of a paginated query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage {
    pub entries: Vec<LogEntry>,
    /// Opaque token resuming after the last delivered entry
    pub next_cursor: String,
    pub has_more: bool,
    /// Malformed records skipped while building this page
    pub decode_errors: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SourceError>,
}

impl ResultPage {
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Summary of a configured or discovered source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub id: String,
    pub path: String,
    pub format: String,
    /// `None` when the file is currently missing or unreadable
    pub size_bytes: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(secs: i64, level: Severity, source: &str, msg: &str, offset: u64) -> LogEntry {
        LogEntry {
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            level,
            source: source.to_string(),
            message: msg.to_string(),
            fields: BTreeMap::new(),
            offset,
        }
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("WARNING".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("err".parse::<Severity>().unwrap(), Severity::Error);
        assert_eq!("Critical".parse::<Severity>().unwrap(), Severity::Fatal);
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Debug);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_merge_cmp_tie_break() {
        let a = entry(10, Severity::Info, "a", "x", 50);
        let b = entry(10, Severity::Info, "b", "x", 0);
        let a2 = entry(10, Severity::Info, "a", "x", 90);
        assert_eq!(a.merge_cmp(&b), Ordering::Less);
        assert_eq!(a.merge_cmp(&a2), Ordering::Less);
        assert_eq!(SortOrder::Desc.apply(a.merge_cmp(&b)), Ordering::Greater);
    }

    #[test]
    fn test_matches_inclusive_time_bounds() {
        let spec = QuerySpec::new().with_time(
            Some(Utc.timestamp_opt(100, 0).unwrap()),
            Some(Utc.timestamp_opt(200, 0).unwrap()),
        );
        assert!(spec.matches(&entry(100, Severity::Info, "a", "x", 0)));
        assert!(spec.matches(&entry(200, Severity::Info, "a", "x", 0)));
        assert!(!spec.matches(&entry(99, Severity::Info, "a", "x", 0)));
        assert!(!spec.matches(&entry(201, Severity::Info, "a", "x", 0)));
    }

    #[test]
    fn test_matches_level_and_text() {
        let spec = QuerySpec::new()
            .with_min_level(Severity::Warn)
            .with_text("DISK");
        assert!(spec.matches(&entry(1, Severity::Error, "a", "disk full", 0)));
        assert!(!spec.matches(&entry(1, Severity::Info, "a", "disk full", 0)));
        assert!(!spec.matches(&entry(1, Severity::Fatal, "a", "oom", 0)));
    }

    #[test]
    fn test_is_past_range() {
        let spec = QuerySpec::new().with_time(None, Some(Utc.timestamp_opt(50, 0).unwrap()));
        assert!(spec.is_past_range(&entry(51, Severity::Info, "a", "x", 0)));
        assert!(!spec.is_past_range(&entry(50, Severity::Info, "a", "x", 0)));
    }

    #[test]
    fn test_validate() {
        assert!(QuerySpec::new().validate(MAX_PAGE_SIZE).is_ok());
        assert!(QuerySpec::new().with_page_size(0).validate(MAX_PAGE_SIZE).is_err());
        assert!(QuerySpec::new().with_page_size(5000).validate(MAX_PAGE_SIZE).is_err());

        let inverted = QuerySpec::new().with_time(
            Some(Utc.timestamp_opt(10, 0).unwrap()),
            Some(Utc.timestamp_opt(5, 0).unwrap()),
        );
        assert!(matches!(inverted.validate(MAX_PAGE_SIZE), Err(Error::BadRequest(_))));

        let mismatched = QuerySpec::new()
            .with_order(SortOrder::Desc)
            .with_cursor(Cursor::new(SortOrder::Asc));
        assert!(matches!(mismatched.validate(MAX_PAGE_SIZE), Err(Error::InvalidCursor(_))));
    }

    #[test]
    fn test_field_value_from_json() {
        assert_eq!(FieldValue::from(serde_json::json!(3)), FieldValue::Int(3));
        assert_eq!(FieldValue::from(serde_json::json!(1.5)), FieldValue::Float(1.5));
        assert_eq!(
            FieldValue::from(serde_json::json!({"a": 1})),
            FieldValue::Str("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn test_result_page_json_shape() {
        let page = ResultPage {
            entries: vec![],
            next_cursor: "abc".to_string(),
            has_more: false,
            decode_errors: 0,
            errors: vec![],
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["nextCursor"], "abc");
        assert_eq!(json["hasMore"], false);
        assert!(json.get("errors").is_none());
    }
}
