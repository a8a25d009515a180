//! Live subscriptions: merged tails with a bounded reordering window

use logdeck_core::{Error, LogEntry, QuerySpec, StreamConfig};
use logdeck_logs::{watch_file, watched_dir, FileWatch, Tail};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{SourceDef, SourceRegistry};

/// One event on a live stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Entry(LogEntry),
    /// The source was rotated or truncated and is being read again from its start
    Reset { source: String },
    /// The source is unavailable; it is retried every poll interval
    SourceError { source: String, message: String },
}

/// Handle on a running subscription. Dropping it cancels the stream.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

impl Subscription {
    pub(crate) fn spawn(
        registry: Arc<SourceRegistry>,
        targets: Vec<(String, SourceDef)>,
        spec: QuerySpec,
        config: StreamConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let cancel = CancellationToken::new();

        let streamer = Streamer::new(registry, targets, spec, config, tx, cancel.clone());
        tokio::spawn(streamer.run());

        Self { rx, cancel }
    }

    /// Next event, or `None` once the subscription has ended
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Stop the stream and release its watchers
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct TailState {
    id: String,
    def: SourceDef,
    /// `None` until the source could be opened
    tail: Option<Tail>,
    /// Offset to start from once opened
    start: u64,
    failing: bool,
}

struct Buffered {
    entry: LogEntry,
    arrived: Instant,
}

struct Streamer {
    registry: Arc<SourceRegistry>,
    states: Vec<TailState>,
    spec: QuerySpec,
    config: StreamConfig,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    /// Held so `wake_rx` stays open when no watcher could be created
    _wake_tx: mpsc::Sender<()>,
    wake_rx: mpsc::Receiver<()>,
    /// One watch per directory, shared by every source inside it
    watches: HashMap<PathBuf, FileWatch>,
    buffer: Vec<Buffered>,
}

impl Streamer {
    fn new(
        registry: Arc<SourceRegistry>,
        targets: Vec<(String, SourceDef)>,
        spec: QuerySpec,
        config: StreamConfig,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let mut watches = HashMap::new();
        let mut unwatchable = Vec::new();

        let states: Vec<TailState> = targets
            .into_iter()
            .map(|(id, def)| {
                let from_cursor = spec.cursor.as_ref().and_then(|c| c.offset(&id));
                let mut state = TailState {
                    id,
                    def,
                    tail: None,
                    start: 0,
                    failing: false,
                };

                match registry.open(&state.id, &state.def) {
                    Ok(source) => {
                        // Without a cursor, follow from the current end like `tail -f`.
                        // A line still being written is delivered once it completes.
                        let start = match from_cursor {
                            Some(offset) => offset,
                            None => source.complete_len().unwrap_or(0),
                        };
                        state.tail = Some(source.tail(start));
                    }
                    Err(e) => {
                        debug!("Source {} not yet available: {}", state.id, e);
                        state.start = from_cursor.unwrap_or(0);
                    }
                }

                let dir = watched_dir(&state.def.path).to_path_buf();
                if !watches.contains_key(&dir) && !unwatchable.contains(&dir) {
                    match watch_file(&state.def.path, wake_tx.clone()) {
                        Ok(watch) => {
                            watches.insert(dir, watch);
                        }
                        Err(e) => {
                            debug!("Polling {} without watcher: {}", dir.display(), e);
                            unwatchable.push(dir);
                        }
                    }
                }
                state
            })
            .collect();

        Self {
            registry,
            states,
            spec,
            config,
            tx,
            cancel,
            _wake_tx: wake_tx,
            wake_rx,
            watches,
            buffer: Vec::new(),
        }
    }

    async fn run(mut self) {
        let window = self.config.window();
        let poll_interval = self.config.poll_interval();

        loop {
            if self.cancel.is_cancelled() || self.tx.is_closed() {
                break;
            }

            let (events, backlog) = self.poll_sources();
            for event in events {
                if !emit(&self.tx, &self.cancel, event).await {
                    return;
                }
            }

            if !self.flush(window, Instant::now()).await {
                return;
            }

            if backlog {
                tokio::task::yield_now().await;
                continue;
            }

            let wait = self
                .buffer
                .iter()
                .map(|b| (b.arrived + window).saturating_duration_since(Instant::now()))
                .min()
                .map_or(poll_interval, |d| d.min(poll_interval));

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.wake_rx.recv() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }

        debug!(
            "Live subscription ended, releasing {} directory watches",
            self.watches.len()
        );
    }

    /// Poll every source once. Returns control events and whether any
    /// source still has unread data.
    fn poll_sources(&mut self) -> (Vec<StreamEvent>, bool) {
        let mut events = Vec::new();
        let mut backlog = false;
        let now = Instant::now();

        for state in &mut self.states {
            if state.tail.is_none() {
                match self.registry.open(&state.id, &state.def) {
                    Ok(source) => {
                        info!("Source {} became available", state.id);
                        state.tail = Some(source.tail(state.start));
                        state.failing = false;
                    }
                    Err(e) => {
                        if !state.failing {
                            state.failing = true;
                            events.push(StreamEvent::SourceError {
                                source: state.id.clone(),
                                message: e.to_string(),
                            });
                        }
                        continue;
                    }
                }
            }

            let Some(tail) = state.tail.as_mut() else {
                continue;
            };

            match tail.poll() {
                Ok(batch) => {
                    if state.failing {
                        info!("Source {} recovered", state.id);
                        state.failing = false;
                    }
                    if batch.malformed > 0 {
                        debug!("Skipped {} undecodable lines in {}", batch.malformed, state.id);
                    }
                    backlog |= !batch.caught_up;
                    for entry in batch.entries {
                        if self.spec.matches(&entry) {
                            self.buffer.push(Buffered { entry, arrived: now });
                        }
                    }
                }
                Err(Error::StreamReset { .. }) => {
                    warn!("Source {} rotated, re-reading from start", state.id);
                    tail.reset();
                    backlog = true;
                    events.push(StreamEvent::Reset {
                        source: state.id.clone(),
                    });
                }
                Err(e) => {
                    if !state.failing {
                        warn!("Source {} unavailable: {}", state.id, e);
                        state.failing = true;
                        events.push(StreamEvent::SourceError {
                            source: state.id.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        (events, backlog)
    }

    /// Emit the longest sorted prefix ending in an entry that has waited a full window
    async fn flush(&mut self, window: std::time::Duration, now: Instant) -> bool {
        if self.buffer.is_empty() {
            return true;
        }

        self.buffer.sort_by(|a, b| a.entry.merge_cmp(&b.entry));
        let Some(last_ripe) = self
            .buffer
            .iter()
            .rposition(|b| now.saturating_duration_since(b.arrived) >= window)
        else {
            return true;
        };

        let ripe: Vec<Buffered> = self.buffer.drain(..=last_ripe).collect();
        for buffered in ripe {
            if !emit(&self.tx, &self.cancel, StreamEvent::Entry(buffered.entry)).await {
                return false;
            }
        }
        true
    }
}

/// Send an event unless the subscriber is gone or cancelled
async fn emit(tx: &mpsc::Sender<StreamEvent>, cancel: &CancellationToken, event: StreamEvent) -> bool {
    tokio::select! {
        sent = tx.send(event) => sent.is_ok(),
        _ = cancel.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use logdeck_core::{LogFormat, Severity, SourceConfig};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_stream_event_json_shape() {
        let entry = LogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            level: Severity::Warn,
            source: "api".to_string(),
            message: "slow request".to_string(),
            fields: BTreeMap::new(),
            offset: 42,
        };

        let json = serde_json::to_value(StreamEvent::Entry(entry)).unwrap();
        assert_eq!(json["type"], "entry");
        assert_eq!(json["source"], "api");
        assert_eq!(json["level"], "warn");
        assert_eq!(json["message"], "slow request");
        assert_eq!(json["offset"], 42);

        let json = serde_json::to_value(StreamEvent::Reset {
            source: "api".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "reset", "source": "api"}));

        let json = serde_json::to_value(StreamEvent::SourceError {
            source: "db".to_string(),
            message: "gone".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "source_error", "source": "db", "message": "gone"})
        );
    }

    #[test]
    fn test_sources_in_one_directory_share_a_watch() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        std::fs::write(dir.path().join("api.log"), b"").unwrap();
        std::fs::write(dir.path().join("db.log"), b"").unwrap();
        std::fs::write(other.path().join("web.log"), b"").unwrap();

        let registry = SourceRegistry::new(
            vec![SourceConfig {
                id: "web".to_string(),
                path: other.path().join("web.log"),
                format: None,
            }],
            Some(dir.path().to_path_buf()),
            "*.log",
            LogFormat::Auto,
        )
        .unwrap();
        let targets = registry.resolve(None).unwrap();
        assert_eq!(targets.len(), 3);

        let (tx, _rx) = mpsc::channel(1);
        let streamer = Streamer::new(
            Arc::new(registry),
            targets,
            QuerySpec::new(),
            StreamConfig::default(),
            tx,
            CancellationToken::new(),
        );

        assert_eq!(streamer.states.len(), 3);
        assert_eq!(streamer.watches.len(), 2);
        assert!(streamer.watches.contains_key(dir.path()));
    }
}
