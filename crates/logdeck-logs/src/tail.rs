//! Following a log file as it grows

use logdeck_core::{Error, LogEntry, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::debug;

use crate::rotation::{is_rotated, FileIdentity};
use crate::source::LogSource;

/// Most records returned by a single poll
const MAX_POLL_RECORDS: usize = 1024;

/// Entries appended since the previous poll
#[derive(Debug, Default)]
pub struct TailBatch {
    pub entries: Vec<LogEntry>,
    /// Lines skipped because they could not be decoded
    pub malformed: usize,
    /// False when the poll stopped early and more data is already waiting
    pub caught_up: bool,
}

/// Restartable follower over one source.
///
/// The position is owned here, not by the source. After a poll fails with
/// `StreamReset` the caller decides whether to [`Tail::reset`] and continue.
/// Waiting for new data is left to the caller, see [`watch_file`].
pub struct Tail {
    source: LogSource,
    offset: u64,
    identity: Option<FileIdentity>,
}

impl Tail {
    pub fn new(source: LogSource, from: u64) -> Self {
        Self {
            source,
            offset: from,
            identity: None,
        }
    }

    pub fn source(&self) -> &LogSource {
        &self.source
    }

    /// Offset of the first byte not yet delivered
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Restart at the beginning of whatever file is now at the path
    pub fn reset(&mut self) {
        debug!("Resetting tail of {} to offset 0", self.source.id());
        self.offset = 0;
        self.identity = None;
    }

    /// Read complete records appended since the last poll without waiting
    pub fn poll(&mut self) -> Result<TailBatch> {
        let file = self.source.open_file()?;
        let meta = file.metadata()?;

        if is_rotated(self.identity, self.offset, &meta) {
            return Err(Error::stream_reset(self.source.id()));
        }
        self.identity = FileIdentity::of(&meta);

        let batch = self.source.read_forward(file, self.offset, MAX_POLL_RECORDS)?;
        self.offset = batch.next_offset;

        Ok(TailBatch {
            entries: batch.records.into_iter().map(|r| r.entry).collect(),
            malformed: batch.malformed.len(),
            caught_up: batch.eof,
        })
    }
}

/// Directory [`watch_file`] watches for `path`
pub fn watched_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Live file-system watch; dropping it stops the notifications
pub struct FileWatch {
    _watcher: RecommendedWatcher,
}

/// Watch the directory holding `path` so renames and re-creations wake the reader.
/// Each event sends a unit wake-up; a full channel already holds one.
pub fn watch_file(path: &Path, tx: mpsc::Sender<()>) -> Result<FileWatch> {
    let dir = watched_dir(path);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(_) => {
                let _ = tx.try_send(());
            }
            Err(e) => debug!("Watch error: {}", e),
        }
    })
    .map_err(|e| Error::ConfigError(format!("Failed to create watcher: {}", e)))?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| Error::ConfigError(format!("Failed to watch {}: {}", dir.display(), e)))?;

    Ok(FileWatch { _watcher: watcher })
}
