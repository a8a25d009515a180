//! Terminal output formatting

use colored::Colorize;
use logdeck_core::{FieldValue, LogEntry, ResultPage, Severity, SourceInfo};
use logdeck_query::StreamEvent;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

/// Global flag for JSON output mode
static JSON_MODE: AtomicBool = AtomicBool::new(false);

/// Enable or disable JSON output mode
pub fn set_json_mode(enabled: bool) {
    JSON_MODE.store(enabled, Ordering::SeqCst);
}

/// Check if JSON output mode is enabled
pub fn is_json_mode() -> bool {
    JSON_MODE.load(Ordering::SeqCst)
}

fn print_json<T: Serialize + ?Sized>(value: &T, pretty: bool) {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match json {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing to JSON: {}", e),
    }
}

#[derive(Tabled)]
pub struct SourceRow {
    #[tabled(rename = "id")]
    pub id: String,
    #[tabled(rename = "format")]
    pub format: String,
    #[tabled(rename = "size")]
    pub size: String,
    #[tabled(rename = "path")]
    pub path: String,
}

impl From<&SourceInfo> for SourceRow {
    fn from(info: &SourceInfo) -> Self {
        SourceRow {
            id: info.id.clone(),
            format: info.format.clone(),
            size: info
                .size_bytes
                .map(format_bytes)
                .unwrap_or_else(|| "missing".red().to_string()),
            path: info.path.clone(),
        }
    }
}

pub fn print_sources_table(sources: &[SourceInfo]) {
    if is_json_mode() {
        print_json(sources, true);
        return;
    }

    if sources.is_empty() {
        println!("No log sources found");
        return;
    }

    let rows: Vec<SourceRow> = sources.iter().map(SourceRow::from).collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Alignment::right()))
        .to_string();

    println!("{}", table);
}

pub fn format_level(level: Severity) -> String {
    let label = format!("{:<5}", level.as_str().to_uppercase());
    match level {
        Severity::Trace => label.dimmed().to_string(),
        Severity::Debug => label.blue().to_string(),
        Severity::Info => label.green().to_string(),
        Severity::Warn => label.yellow().to_string(),
        Severity::Error => label.red().to_string(),
        Severity::Fatal => label.red().bold().to_string(),
    }
}

fn field_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => "null".to_string(),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Int(i) => i.to_string(),
        FieldValue::Float(f) => f.to_string(),
        FieldValue::Str(s) if s.contains(' ') => format!("{:?}", s),
        FieldValue::Str(s) => s.clone(),
    }
}

/// One line per entry: time, level, source, message, then `key=value` fields
pub fn format_entry(entry: &LogEntry) -> String {
    let mut line = format!(
        "{} {} {} {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
        format_level(entry.level),
        format!("[{}]", entry.source).cyan(),
        entry.message
    );
    for (key, value) in &entry.fields {
        line.push_str(&format!(" {}={}", key.dimmed(), field_text(value)));
    }
    line
}

pub fn print_entry(entry: &LogEntry) {
    if is_json_mode() {
        print_json(entry, false);
    } else {
        println!("{}", format_entry(entry));
    }
}

/// Control events from a live stream
pub fn print_event(event: &StreamEvent) {
    if is_json_mode() {
        print_json(event, false);
        return;
    }

    match event {
        StreamEvent::Entry(entry) => println!("{}", format_entry(entry)),
        StreamEvent::Reset { source } => {
            eprintln!("{} {} was rotated, reading from the start", "↻".yellow(), source)
        }
        StreamEvent::SourceError { source, message } => print_error(&format!("{}: {}", source, message)),
    }
}

pub fn print_page(page: &ResultPage) {
    if is_json_mode() {
        print_json(page, true);
        return;
    }

    if page.entries.is_empty() {
        println!("No matching entries");
    }
    for entry in &page.entries {
        println!("{}", format_entry(entry));
    }

    for error in &page.errors {
        print_error(&format!("{}: {}", error.source, error.message));
    }
    if page.decode_errors > 0 {
        eprintln!(
            "{} skipped {} malformed records",
            "!".yellow(),
            page.decode_errors
        );
    }
    if page.has_more {
        println!("{} more: --cursor {}", "ℹ".blue(), page.next_cursor);
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1}G", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1}M", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.0}K", bytes as f64 / 1024.0)
    } else if bytes > 0 {
        format!("{}B", bytes)
    } else {
        "0B".to_string()
    }
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}
