//! logbridge Buffer - Bounded in-memory entry store
//!
//! Keeps the most recent entries in insertion order and supports
//! non-destructive "baseline" clears: a soft clear records a cutoff per scope
//! and reads hide anything older than the highest cutoff that applies.

use logbridge_core::{constants, now_ms, render_entry, ClearMode, Entry, Level, Scope};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Filters applied by [`RingBuffer::snapshot`]
#[derive(Debug, Clone, Default)]
pub struct SnapshotQuery {
    pub scope: Option<Scope>,
    pub levels: Option<Vec<Level>>,
    pub contains: Option<String>,
    /// Minimum timestamp (ms); entries without a timestamp are kept
    pub since: Option<i64>,
    pub tag: Option<String>,
    /// Return only the most recent `limit` matches
    pub limit: Option<usize>,
}

impl SnapshotQuery {
    pub fn scoped(scope: Scope) -> Self {
        Self {
            scope: Some(scope),
            ..Default::default()
        }
    }

    pub fn session(id: impl Into<String>) -> Self {
        Self::scoped(Scope::Session(id.into()))
    }

    pub fn with_levels(mut self, levels: Vec<Level>) -> Self {
        self.levels = Some(levels);
        self
    }

    pub fn with_contains(mut self, needle: impl Into<String>) -> Self {
        self.contains = Some(needle.into());
        self
    }

    pub fn with_since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Snapshot result with the count of entries hidden by baselines
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotReport {
    pub entries: Vec<Entry>,
    pub hidden_by_baseline: usize,
}

/// Buffer occupancy and active baselines
#[derive(Debug, Clone, Serialize)]
pub struct BufferStats {
    pub len: usize,
    pub capacity: usize,
    pub baselines: HashMap<String, i64>,
}

/// Bounded FIFO entry store
#[derive(Debug)]
pub struct RingBuffer {
    entries: VecDeque<Entry>,
    max: usize,
    baselines: HashMap<String, i64>,
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(constants::DEFAULT_CAPACITY)
    }
}

impl RingBuffer {
    /// Create a buffer; capacity is clamped to the minimum floor
    pub fn new(max: usize) -> Self {
        let max = max.max(constants::MIN_CAPACITY);
        Self {
            entries: VecDeque::with_capacity(max),
            max,
            baselines: HashMap::new(),
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn append(&mut self, entry: Entry) {
        if self.entries.len() >= self.max {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Append every entry in order
    pub fn extend<I: IntoIterator<Item = Entry>>(&mut self, entries: I) {
        for entry in entries {
            self.append(entry);
        }
    }

    /// Change the capacity, evicting oldest-first when shrinking.
    /// Returns the effective capacity after clamping.
    pub fn set_capacity(&mut self, n: usize) -> usize {
        self.max = n.max(constants::MIN_CAPACITY);
        while self.entries.len() > self.max {
            self.entries.pop_front();
        }
        self.max
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear at `scope` (global when `None`) using the current time as cutoff.
    /// Returns the number of entries removed (always 0 for soft clears).
    pub fn clear(&mut self, scope: Option<&Scope>, mode: ClearMode) -> usize {
        self.clear_at(scope, mode, now_ms())
    }

    /// Clear with an explicit cutoff instant
    pub fn clear_at(&mut self, scope: Option<&Scope>, mode: ClearMode, now: i64) -> usize {
        match (mode, scope) {
            (ClearMode::Soft, scope) => {
                let key = scope.unwrap_or(&Scope::Global).key();
                debug!("Baseline set for {} at {}", key, now);
                self.baselines.insert(key, now);
                0
            }
            (ClearMode::Hard, None) | (ClearMode::Hard, Some(Scope::Global)) => {
                let removed = self.entries.len();
                self.entries.clear();
                self.baselines.clear();
                removed
            }
            (ClearMode::Hard, Some(scope)) => {
                let before = self.entries.len();
                self.entries.retain(|entry| !scope.matches(entry));
                self.baselines.remove(&scope.key());
                before - self.entries.len()
            }
        }
    }

    /// Highest baseline cutoff that applies to an entry
    fn cutoff_for(&self, entry: &Entry) -> Option<i64> {
        let session_key = Scope::Session(entry.session_id.clone()).key();
        let project_key = entry
            .project
            .as_ref()
            .map(|p| Scope::Project(p.clone()).key());

        [Some("global".to_string()), Some(session_key), project_key]
            .into_iter()
            .flatten()
            .filter_map(|key| self.baselines.get(&key).copied())
            .max()
    }

    fn hidden_by_baseline(&self, entry: &Entry) -> bool {
        match (entry.time, self.cutoff_for(entry)) {
            (Some(time), Some(cutoff)) => time < cutoff,
            _ => false,
        }
    }

    /// Entries matching the query, oldest first
    pub fn snapshot(&self, query: &SnapshotQuery) -> Vec<Entry> {
        self.snapshot_report(query).entries
    }

    /// Like [`snapshot`](Self::snapshot) but also reports baseline-hidden entries
    pub fn snapshot_report(&self, query: &SnapshotQuery) -> SnapshotReport {
        let mut hidden = 0;
        let mut in_scope = 0;

        let mut matched: Vec<Entry> = self
            .entries
            .iter()
            .filter(|entry| query.scope.as_ref().map_or(true, |s| s.matches(entry)))
            .filter(|entry| {
                in_scope += 1;
                if self.hidden_by_baseline(entry) {
                    hidden += 1;
                    false
                } else {
                    true
                }
            })
            .filter(|entry| {
                query
                    .levels
                    .as_ref()
                    .map_or(true, |levels| levels.contains(&entry.level))
            })
            .filter(|entry| {
                query
                    .contains
                    .as_ref()
                    .map_or(true, |needle| entry.text.contains(needle.as_str()))
            })
            .filter(|entry| match (query.since, entry.time) {
                (Some(since), Some(time)) => time >= since,
                _ => true,
            })
            .filter(|entry| {
                query
                    .tag
                    .as_ref()
                    .map_or(true, |tag| entry.tag.as_deref() == Some(tag.as_str()))
            })
            .cloned()
            .collect();

        if in_scope > 0 && hidden == in_scope {
            debug!(
                "All {} entries in scope {} are hidden by baselines",
                in_scope,
                query.scope.as_ref().map(Scope::key).unwrap_or_else(|| "global".into())
            );
        }

        if let Some(limit) = query.limit {
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }

        SnapshotReport {
            entries: matched,
            hidden_by_baseline: hidden,
        }
    }

    /// Render matching entries as human-readable lines
    pub fn to_text(&self, query: &SnapshotQuery) -> String {
        self.snapshot(query)
            .iter()
            .map(render_entry)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            len: self.entries.len(),
            capacity: self.max,
            baselines: self.baselines.clone(),
        }
    }
}
