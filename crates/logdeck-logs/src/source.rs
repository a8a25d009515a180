//! Stateless ranged reads over a single log file
//!
//! A [`LogSource`] never remembers a position. Every read takes the offset
//! from the caller and hands back the offset to resume from, so one source
//! can serve any number of concurrent queries.

use logdeck_core::{Error, LogEntry, Result};
use std::fs::{File, Metadata};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::decoder::LogDecoder;
use crate::rotation::FileIdentity;
use crate::tail::Tail;

/// Bytes read per step when scanning backwards
const BACK_CHUNK_BYTES: u64 = 8192;

/// Longest line buffered by a backward scan; longer lines are skipped as malformed
const MAX_LINE_BYTES: u64 = 1 << 20;

/// A decoded entry together with the offset just past its line
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub entry: LogEntry,
    /// First byte after the record's newline
    pub end: u64,
}

/// Result of one ranged read
#[derive(Debug, Clone, Default)]
pub struct ReadBatch {
    /// Records in scan order (file order forwards, newest first backwards)
    pub records: Vec<LogRecord>,
    /// Offset to resume the scan from
    pub next_offset: u64,
    /// Start offsets of lines skipped because they could not be decoded
    pub malformed: Vec<u64>,
    /// No complete line remained in scan direction
    pub eof: bool,
}

/// Handle on one append-only log file
#[derive(Debug, Clone)]
pub struct LogSource {
    id: String,
    path: PathBuf,
    decoder: Arc<dyn LogDecoder>,
}

impl LogSource {
    /// Open a source, checking the file exists and is readable
    pub fn open(id: impl Into<String>, path: impl Into<PathBuf>, decoder: Arc<dyn LogDecoder>) -> Result<Self> {
        let source = Self {
            id: id.into(),
            path: path.into(),
            decoder,
        };
        let meta = std::fs::metadata(&source.path).map_err(|e| Error::from_io(&source.path, e))?;
        if meta.is_dir() {
            return Err(Error::config(format!(
                "Log source {} is a directory",
                source.path.display()
            )));
        }
        source.open_file()?;
        Ok(source)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> &'static str {
        self.decoder.name()
    }

    /// Current file size
    pub fn size(&self) -> Result<u64> {
        Ok(self.metadata()?.len())
    }

    pub fn metadata(&self) -> Result<Metadata> {
        std::fs::metadata(&self.path).map_err(|e| Error::from_io(&self.path, e))
    }

    /// End of the last complete line. A line still being written starts here.
    pub fn complete_len(&self) -> Result<u64> {
        let mut file = self.open_file()?;
        let len = file.metadata()?.len();
        line_boundary_before(&mut file, len)
    }

    pub fn identity(&self) -> Result<Option<FileIdentity>> {
        Ok(FileIdentity::of(&self.metadata()?))
    }

    pub(crate) fn open_file(&self) -> Result<File> {
        File::open(&self.path).map_err(|e| Error::from_io(&self.path, e))
    }

    /// Read up to `max_entries` records starting at byte `from`.
    ///
    /// A trailing line without its newline is left for a later read.
    /// Fails with `StreamReset` when `from` lies beyond the end of the file.
    pub fn read_range(&self, from: u64, max_entries: usize) -> Result<ReadBatch> {
        let file = self.open_file()?;
        self.read_forward(file, from, max_entries)
    }

    pub(crate) fn read_forward(&self, mut file: File, from: u64, max_entries: usize) -> Result<ReadBatch> {
        let len = file.metadata()?.len();
        if from > len {
            return Err(Error::stream_reset(&self.id));
        }

        file.seek(SeekFrom::Start(from))?;
        let mut reader = BufReader::new(file);
        let mut batch = ReadBatch {
            next_offset: from,
            ..Default::default()
        };
        let mut position = from;
        let mut line = Vec::new();

        while batch.records.len() < max_entries {
            line.clear();
            let n = reader.read_until(b'\n', &mut line)?;
            if n == 0 || line.last() != Some(&b'\n') {
                batch.eof = true;
                break;
            }

            let start = position;
            position += n as u64;
            self.decode_line(&line, start, position, &mut batch);
            batch.next_offset = position;
        }

        if !batch.eof && position >= len {
            batch.eof = true;
        }

        debug!(
            "Read {} records from {} [{}..{})",
            batch.records.len(),
            self.id,
            from,
            batch.next_offset
        );
        Ok(batch)
    }

    /// Read up to `max_entries` records ending before byte `before`, newest first.
    ///
    /// `before` past the end of the file is clamped; a partial last line is
    /// skipped. The returned `next_offset` is the new upper bound.
    pub fn read_range_back(&self, before: u64, max_entries: usize) -> Result<ReadBatch> {
        let mut file = self.open_file()?;
        let len = file.metadata()?.len();
        let mut end = line_boundary_before(&mut file, before.min(len))?;

        let mut batch = ReadBatch::default();
        let mut chunk_size = BACK_CHUNK_BYTES;

        'chunks: while end > 0 && batch.records.len() < max_entries {
            let start = end.saturating_sub(chunk_size);
            let buffer = read_exact_at(&mut file, start, end - start)?;

            // Everything up to the first newline may be the tail of an earlier line
            let body_start = if start == 0 {
                0
            } else {
                match buffer[..buffer.len() - 1].iter().position(|&b| b == b'\n') {
                    Some(i) => i + 1,
                    None if chunk_size >= MAX_LINE_BYTES => {
                        let line_start = line_boundary_before(&mut file, start)?;
                        debug!(
                            "Skipping {} byte record in {} at offset {}",
                            end - line_start,
                            self.id,
                            line_start
                        );
                        batch.malformed.push(line_start);
                        end = line_start;
                        chunk_size = BACK_CHUNK_BYTES;
                        continue;
                    }
                    None => {
                        chunk_size = (chunk_size * 2).min(MAX_LINE_BYTES);
                        continue;
                    }
                }
            };

            let mut line_end = buffer.len();
            for i in (body_start..buffer.len() - 1).rev().chain(std::iter::once(usize::MAX)) {
                let line_start = if i == usize::MAX {
                    body_start
                } else if buffer[i] == b'\n' {
                    i + 1
                } else {
                    continue;
                };

                if batch.records.len() >= max_entries {
                    break 'chunks;
                }

                let abs_start = start + line_start as u64;
                let abs_end = start + line_end as u64;
                self.decode_line(&buffer[line_start..line_end], abs_start, abs_end, &mut batch);
                end = abs_start;
                line_end = line_start;
            }

            chunk_size = BACK_CHUNK_BYTES;
        }

        batch.next_offset = end;
        batch.eof = end == 0;
        Ok(batch)
    }

    fn decode_line(&self, raw: &[u8], start: u64, end: u64, batch: &mut ReadBatch) {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches(['\n', '\r']);
        if text.trim().is_empty() {
            return;
        }

        match self.decoder.decode(text) {
            Some(record) => batch.records.push(LogRecord {
                entry: LogEntry {
                    timestamp: record.timestamp,
                    level: record.level,
                    source: self.id.clone(),
                    message: record.message,
                    fields: record.fields,
                    offset: start,
                },
                end,
            }),
            None => {
                debug!("Skipping malformed record in {} at offset {}", self.id, start);
                batch.malformed.push(start);
            }
        }
    }

    /// Follow the file from `from` (like tail -f)
    pub fn tail(&self, from: u64) -> Tail {
        Tail::new(self.clone(), from)
    }
}

fn read_exact_at(file: &mut File, start: u64, len: u64) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(start))?;
    let mut buffer = vec![0u8; len as usize];
    file.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Largest offset `<= end` that starts a line
fn line_boundary_before(file: &mut File, end: u64) -> Result<u64> {
    if end == 0 {
        return Ok(0);
    }

    let mut position = end;
    while position > 0 {
        let read_size = std::cmp::min(BACK_CHUNK_BYTES, position);
        let start = position - read_size;
        let buffer = read_exact_at(file, start, read_size)?;

        if position == end && buffer.last() == Some(&b'\n') {
            return Ok(end);
        }
        if let Some(i) = buffer.iter().rposition(|&b| b == b'\n') {
            return Ok(start + i as u64 + 1);
        }
        position = start;
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{decoder_for, JsonLinesDecoder};
    use logdeck_core::LogFormat;
    use std::io::Write;
    use tempfile::TempDir;

    fn line(i: usize) -> String {
        format!(
            "{{\"ts\":\"2024-01-01T00:00:{:02}Z\",\"level\":\"info\",\"msg\":\"line {}\"}}\n",
            i % 60,
            i
        )
    }

    fn write_lines(path: &Path, range: std::ops::Range<usize>) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        for i in range {
            file.write_all(line(i).as_bytes()).unwrap();
        }
    }

    fn open(path: &Path) -> LogSource {
        LogSource::open("app", path, Arc::new(JsonLinesDecoder)).unwrap()
    }

    fn messages(batch: &ReadBatch) -> Vec<String> {
        batch.records.iter().map(|r| r.entry.message.clone()).collect()
    }

    #[test]
    fn test_open_nonexistent() {
        let err = LogSource::open("x", "/nonexistent/file.log", decoder_for(LogFormat::Auto)).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_open_directory() {
        let dir = TempDir::new().unwrap();
        assert!(LogSource::open("x", dir.path(), decoder_for(LogFormat::Auto)).is_err());
    }

    #[test]
    fn test_read_range_paged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, 0..10);
        let source = open(&path);

        let first = source.read_range(0, 4).unwrap();
        assert_eq!(messages(&first), vec!["line 0", "line 1", "line 2", "line 3"]);
        assert!(!first.eof);
        assert_eq!(first.records[0].entry.offset, 0);
        assert_eq!(first.records[1].entry.offset, first.records[0].end);

        let rest = source.read_range(first.next_offset, 100).unwrap();
        assert_eq!(rest.records.len(), 6);
        assert!(rest.eof);
        assert_eq!(rest.next_offset, source.size().unwrap());
    }

    #[test]
    fn test_read_range_skips_partial_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, 0..2);
        let complete = std::fs::metadata(&path).unwrap().len();
        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"{\"ts\":\"2024-01-01T00:00:09Z\",\"msg\":\"half").unwrap();
        }

        let source = open(&path);
        let batch = source.read_range(0, 100).unwrap();
        assert_eq!(batch.records.len(), 2);
        assert!(batch.malformed.is_empty());
        assert_eq!(batch.next_offset, complete);
        assert!(batch.eof);
        assert_eq!(source.complete_len().unwrap(), complete);
    }

    #[test]
    fn test_complete_len_without_partial_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"").unwrap();
        let source = open(&path);
        assert_eq!(source.complete_len().unwrap(), 0);

        write_lines(&path, 0..3);
        assert_eq!(source.complete_len().unwrap(), source.size().unwrap());
    }

    #[test]
    fn test_read_range_beyond_end_resets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, 0..1);
        let source = open(&path);
        let err = source.read_range(10_000, 10).unwrap_err();
        assert!(matches!(err, Error::StreamReset { source_id } if source_id == "app"));
    }

    #[test]
    fn test_malformed_lines_counted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, 0..5);
        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"this is not json\n\n").unwrap();
        }
        write_lines(&path, 5..10);

        let source = open(&path);
        let batch = source.read_range(0, 100).unwrap();
        assert_eq!(batch.records.len(), 10);
        assert_eq!(batch.malformed, vec![batch.records[4].end]);
    }

    #[test]
    fn test_read_range_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, 0..10);
        let source = open(&path);
        let size = source.size().unwrap();

        let newest = source.read_range_back(size, 3).unwrap();
        assert_eq!(messages(&newest), vec!["line 9", "line 8", "line 7"]);
        assert!(!newest.eof);
        assert_eq!(newest.next_offset, newest.records[2].entry.offset);

        let older = source.read_range_back(newest.next_offset, 100).unwrap();
        assert_eq!(older.records.len(), 7);
        assert_eq!(older.records[0].entry.message, "line 6");
        assert_eq!(older.records[6].entry.message, "line 0");
        assert!(older.eof);
        assert_eq!(older.next_offset, 0);
    }

    #[test]
    fn test_read_range_back_across_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        // Enough data to span several backward chunks
        write_lines(&path, 0..600);
        let source = open(&path);

        let batch = source.read_range_back(u64::MAX, 1000).unwrap();
        assert_eq!(batch.records.len(), 600);
        assert!(batch.malformed.is_empty());
        for (i, record) in batch.records.iter().enumerate() {
            assert_eq!(record.entry.message, format!("line {}", 599 - i));
        }
    }

    #[test]
    fn test_read_range_back_skips_partial_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, 0..3);
        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"{\"partial").unwrap();
        }
        let source = open(&path);
        let batch = source.read_range_back(source.size().unwrap(), 10).unwrap();
        assert_eq!(messages(&batch), vec!["line 2", "line 1", "line 0"]);
        assert!(batch.malformed.is_empty());
    }

    #[test]
    fn test_read_range_back_skips_oversized_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, 0..3);
        let long_start = std::fs::metadata(&path).unwrap().len();
        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            let mut blob = vec![b'x'; (MAX_LINE_BYTES + MAX_LINE_BYTES / 2) as usize];
            blob.push(b'\n');
            file.write_all(&blob).unwrap();
        }
        write_lines(&path, 3..6);

        let source = open(&path);
        let batch = source.read_range_back(u64::MAX, 100).unwrap();
        assert_eq!(
            messages(&batch),
            vec!["line 5", "line 4", "line 3", "line 2", "line 1", "line 0"]
        );
        assert_eq!(batch.malformed, vec![long_start]);
        assert!(batch.eof);
    }

    #[test]
    fn test_concurrent_reads_are_independent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, 0..50);
        let source = open(&path);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let source = source.clone();
                std::thread::spawn(move || {
                    let mut offset = 0;
                    let mut seen = 0;
                    loop {
                        let batch = source.read_range(offset, 7).unwrap();
                        seen += batch.records.len();
                        offset = batch.next_offset;
                        if batch.eof {
                            break;
                        }
                    }
                    seen
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 50);
        }
    }
}
