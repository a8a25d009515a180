//! k-way merge of per-source runs

use chrono::{DateTime, Utc};
use logdeck_core::{LogEntry, SortOrder};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

/// Front of one run, ordered so the max-heap pops the next entry to emit
struct Head {
    key: (DateTime<Utc>, String, u64),
    run: usize,
    order: SortOrder,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        let asc = self.key.cmp(&other.key).then_with(|| self.run.cmp(&other.run));
        // BinaryHeap pops the greatest element
        self.order.apply(asc).reverse()
    }
}

fn head(entry: &LogEntry, run: usize, order: SortOrder) -> Head {
    Head {
        key: (entry.timestamp, entry.source.clone(), entry.offset),
        run,
        order,
    }
}

/// Output of [`merge_runs`]
#[derive(Debug)]
pub struct Merged {
    pub entries: Vec<LogEntry>,
    /// How many entries were taken from the front of each run
    pub consumed: Vec<usize>,
}

/// Merge runs (each already in scan order) by `(timestamp, source, offset)`,
/// stopping after `limit` entries. Only run prefixes are ever consumed.
pub fn merge_runs(runs: Vec<Vec<LogEntry>>, order: SortOrder, limit: usize) -> Merged {
    let mut consumed = vec![0; runs.len()];
    let mut runs: Vec<VecDeque<LogEntry>> = runs.into_iter().map(VecDeque::from).collect();
    let mut heap = BinaryHeap::with_capacity(runs.len());

    for (i, run) in runs.iter().enumerate() {
        if let Some(front) = run.front() {
            heap.push(head(front, i, order));
        }
    }

    let mut entries = Vec::with_capacity(limit.min(64));
    while entries.len() < limit {
        let Some(Head { run, .. }) = heap.pop() else {
            break;
        };
        let Some(entry) = runs[run].pop_front() else {
            continue;
        };
        consumed[run] += 1;
        if let Some(next) = runs[run].front() {
            heap.push(head(next, run, order));
        }
        entries.push(entry);
    }

    Merged { entries, consumed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use logdeck_core::Severity;
    use std::collections::BTreeMap;

    fn entry(secs: i64, source: &str, offset: u64) -> LogEntry {
        LogEntry {
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            level: Severity::Info,
            source: source.to_string(),
            message: format!("{}@{}", source, offset),
            fields: BTreeMap::new(),
            offset,
        }
    }

    fn labels(merged: &Merged) -> Vec<String> {
        merged.entries.iter().map(|e| e.message.clone()).collect()
    }

    #[test]
    fn test_merge_ascending_with_ties() {
        let a = vec![entry(1, "a", 0), entry(2, "a", 10), entry(2, "a", 20)];
        let b = vec![entry(2, "b", 0), entry(3, "b", 10)];

        let merged = merge_runs(vec![b, a], SortOrder::Asc, 10);
        assert_eq!(
            labels(&merged),
            vec!["a@0", "a@10", "a@20", "b@0", "b@10"]
        );
        assert_eq!(merged.consumed, vec![2, 3]);
    }

    #[test]
    fn test_merge_descending() {
        let a = vec![entry(3, "a", 20), entry(1, "a", 0)];
        let b = vec![entry(3, "b", 5), entry(2, "b", 0)];

        let merged = merge_runs(vec![a, b], SortOrder::Desc, 10);
        assert_eq!(labels(&merged), vec!["b@5", "a@20", "b@0", "a@0"]);
    }

    #[test]
    fn test_merge_limit_consumes_prefixes() {
        let a = vec![entry(1, "a", 0), entry(4, "a", 10)];
        let b = vec![entry(2, "b", 0), entry(3, "b", 10)];

        let merged = merge_runs(vec![a, b], SortOrder::Asc, 3);
        assert_eq!(labels(&merged), vec!["a@0", "b@0", "b@10"]);
        assert_eq!(merged.consumed, vec![1, 2]);
    }

    #[test]
    fn test_merge_empty_runs() {
        let merged = merge_runs(vec![vec![], vec![]], SortOrder::Asc, 5);
        assert!(merged.entries.is_empty());
        assert_eq!(merged.consumed, vec![0, 0]);
    }
}
