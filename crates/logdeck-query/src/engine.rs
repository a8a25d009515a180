//! Paginated queries over one or more sources

use logdeck_core::{
    constants, Cursor, Error, LogEntry, QuerySpec, Result, ResultPage, ServerConfig, SortOrder,
    SourceError, SourceInfo, StreamConfig,
};
use logdeck_logs::{LogRecord, LogSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::merge::merge_runs;
use crate::registry::{SourceDef, SourceRegistry};
use crate::subscribe::Subscription;

/// Engine limits
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub stream: StreamConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: constants::DEFAULT_PAGE_SIZE,
            max_page_size: constants::MAX_PAGE_SIZE,
            stream: StreamConfig::default(),
        }
    }
}

impl From<&ServerConfig> for EngineConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            stream: config.stream.clone(),
        }
    }
}

/// What one source contributed to a page
struct SourceScan {
    id: String,
    matches: Vec<LogRecord>,
    /// Where the scan stopped, in scan direction
    scanned_to: u64,
    /// Nothing further in scan direction can match
    exhausted: bool,
    /// Start offsets of undecodable lines passed over
    malformed: Vec<u64>,
}

impl SourceScan {
    fn new(id: &str, start: u64) -> Self {
        Self {
            id: id.to_string(),
            matches: Vec::new(),
            scanned_to: start,
            exhausted: false,
            malformed: Vec::new(),
        }
    }

    /// Offset a follow-up page resumes from after `consumed` matches were delivered
    fn resume_offset(&self, consumed: usize, order: SortOrder) -> u64 {
        match self.matches.get(consumed) {
            Some(record) => match order {
                SortOrder::Asc => record.entry.offset,
                SortOrder::Desc => record.end,
            },
            None => self.scanned_to,
        }
    }

    /// Undecodable lines this page moves past. Lines beyond the resume offset
    /// are scanned again by the next page and counted there.
    fn decode_errors(&self, resume: u64, order: SortOrder) -> usize {
        self.malformed
            .iter()
            .filter(|&&offset| match order {
                SortOrder::Asc => offset < resume,
                SortOrder::Desc => offset >= resume,
            })
            .count()
    }

    fn has_more(&self, consumed: usize) -> bool {
        consumed < self.matches.len() || !self.exhausted
    }
}

/// Query engine over the registered sources
pub struct LogQueryEngine {
    registry: Arc<SourceRegistry>,
    config: EngineConfig,
}

impl LogQueryEngine {
    pub fn new(registry: SourceRegistry, config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let registry = SourceRegistry::from_config(config)?;
        Ok(Self::new(registry, EngineConfig::from(config)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn sources(&self) -> Vec<SourceInfo> {
        self.registry.list()
    }

    /// Run one page of a query.
    ///
    /// A source that fails is reported in `errors` and keeps its cursor
    /// position, unless the query named exactly that one source, in which
    /// case its error is returned.
    pub fn execute(&self, spec: &QuerySpec) -> Result<ResultPage> {
        spec.validate(self.config.max_page_size)?;

        let targets = self.registry.resolve(spec.sources.as_deref())?;
        let direct = spec.sources.as_ref().map_or(false, |s| s.len() == 1);
        let cursor = spec.cursor.clone().unwrap_or_else(|| Cursor::new(spec.order));

        let mut scans = Vec::with_capacity(targets.len());
        let mut errors = Vec::new();

        for (id, def) in &targets {
            match self.scan_source(id, def, cursor.offset(id), spec) {
                Ok(scan) => scans.push(scan),
                Err(e) if direct => return Err(e),
                Err(e) => {
                    warn!("Source {} failed during query: {}", id, e);
                    errors.push(SourceError::new(id.as_str(), &e));
                }
            }
        }

        let runs: Vec<Vec<LogEntry>> = scans
            .iter()
            .map(|scan| scan.matches.iter().map(|r| r.entry.clone()).collect())
            .collect();
        let merged = merge_runs(runs, spec.order, spec.page_size);

        // Offsets of sources outside this query, or failing ones, carry over unchanged
        let mut next = cursor;
        let mut has_more = false;
        let mut decode_errors = 0;
        for (scan, &consumed) in scans.iter().zip(&merged.consumed) {
            let resume = scan.resume_offset(consumed, spec.order);
            decode_errors += scan.decode_errors(resume, spec.order);
            next.set_offset(scan.id.clone(), resume);
            has_more |= scan.has_more(consumed);
        }

        debug!(
            "Query over {} sources returned {} entries (has_more={}, decode_errors={})",
            targets.len(),
            merged.entries.len(),
            has_more,
            decode_errors
        );

        Ok(ResultPage {
            entries: merged.entries,
            next_cursor: next.encode(),
            has_more,
            decode_errors,
            errors,
        })
    }

    fn scan_source(
        &self,
        id: &str,
        def: &SourceDef,
        start: Option<u64>,
        spec: &QuerySpec,
    ) -> Result<SourceScan> {
        let source = self.registry.open(id, def)?;
        match spec.order {
            SortOrder::Asc => scan_forward(&source, start.unwrap_or(0), spec),
            SortOrder::Desc => {
                let size = source.size()?;
                let bound = start.map_or(size, |b| b.min(size));
                scan_backward(&source, bound, spec)
            }
        }
    }

    /// End of the last complete line of every source that can be opened.
    /// Cursors built from these split a backlog from a live stream without
    /// cutting a line that is still being written.
    pub fn line_ends(&self) -> BTreeMap<String, u64> {
        let Ok(targets) = self.registry.resolve(None) else {
            return BTreeMap::new();
        };
        targets
            .iter()
            .filter_map(|(id, def)| {
                let source = self.registry.open(id, def).ok()?;
                match source.complete_len() {
                    Ok(end) => Some((id.clone(), end)),
                    Err(e) => {
                        debug!("Skipping {} when locating line ends: {}", id, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Start a live subscription matching `spec`'s filter
    pub fn subscribe(&self, spec: QuerySpec) -> Result<Subscription> {
        if let Some(cursor) = &spec.cursor {
            if cursor.order != SortOrder::Asc {
                return Err(Error::InvalidCursor(
                    "live streams resume from ascending cursors only".to_string(),
                ));
            }
        }
        let spec = QuerySpec {
            order: SortOrder::Asc,
            ..spec
        };
        spec.validate(self.config.max_page_size)?;

        let targets = self.registry.resolve(spec.sources.as_deref())?;
        let direct = spec.sources.as_ref().map_or(false, |s| s.len() == 1);
        if direct {
            let (id, def) = &targets[0];
            self.registry.open(id, def)?;
        }

        info!("Starting live subscription over {} sources", targets.len());
        Ok(Subscription::spawn(
            Arc::clone(&self.registry),
            targets,
            spec,
            self.config.stream.clone(),
        ))
    }
}

fn next_chunk(chunk: usize) -> usize {
    (chunk * 2).min(constants::MAX_SCAN_CHUNK)
}

fn first_chunk(page_size: usize) -> usize {
    page_size.clamp(constants::MIN_SCAN_CHUNK, constants::MAX_SCAN_CHUNK)
}

fn scan_forward(source: &LogSource, start: u64, spec: &QuerySpec) -> Result<SourceScan> {
    let mut scan = SourceScan::new(source.id(), start);
    let mut offset = start;
    let mut chunk = first_chunk(spec.page_size);

    loop {
        let batch = match source.read_range(offset, chunk) {
            Err(Error::StreamReset { .. }) if offset > 0 => {
                warn!(
                    "Source {} shrank below cursor offset {}, restarting from 0",
                    source.id(),
                    offset
                );
                offset = 0;
                scan.scanned_to = 0;
                scan.malformed.clear();
                continue;
            }
            other => other?,
        };
        scan.malformed.extend(batch.malformed);

        let last = batch.records.len().saturating_sub(1);
        for (i, record) in batch.records.into_iter().enumerate() {
            if spec.is_past_range(&record.entry) {
                scan.scanned_to = record.entry.offset;
                scan.exhausted = true;
                return Ok(scan);
            }

            scan.scanned_to = record.end;
            if spec.matches(&record.entry) {
                scan.matches.push(record);
                if scan.matches.len() >= spec.page_size {
                    scan.exhausted = batch.eof && i == last;
                    return Ok(scan);
                }
            }
        }

        scan.scanned_to = batch.next_offset;
        if batch.eof {
            scan.exhausted = true;
            return Ok(scan);
        }
        offset = batch.next_offset;
        chunk = next_chunk(chunk);
    }
}

fn scan_backward(source: &LogSource, bound: u64, spec: &QuerySpec) -> Result<SourceScan> {
    let mut scan = SourceScan::new(source.id(), bound);
    let mut before = bound;
    let mut chunk = first_chunk(spec.page_size);

    loop {
        let batch = source.read_range_back(before, chunk)?;
        scan.malformed.extend(batch.malformed);

        let last = batch.records.len().saturating_sub(1);
        for (i, record) in batch.records.into_iter().enumerate() {
            if spec.is_past_range(&record.entry) {
                scan.scanned_to = record.end;
                scan.exhausted = true;
                return Ok(scan);
            }

            scan.scanned_to = record.entry.offset;
            if spec.matches(&record.entry) {
                scan.matches.push(record);
                if scan.matches.len() >= spec.page_size {
                    scan.exhausted = batch.eof && i == last;
                    return Ok(scan);
                }
            }
        }

        scan.scanned_to = batch.next_offset;
        if batch.eof {
            scan.exhausted = true;
            return Ok(scan);
        }
        before = batch.next_offset;
        chunk = next_chunk(chunk);
    }
}
