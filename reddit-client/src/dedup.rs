use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// How long an id counts as seen (in seconds)
    pub retention_secs: u64,
    /// Hard cap on tracked ids; the oldest are dropped first
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_secs: 24 * 60 * 60,
            max_entries: 10_000,
        }
    }
}

impl DedupConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Remembers which item ids were already handed to the dispatcher.
#[derive(Debug)]
pub struct DedupTracker {
    seen: HashMap<String, Instant>,
    order: VecDeque<String>,
    retention: Duration,
    max_entries: usize,
}

impl DedupTracker {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            seen: HashMap::new(),
            order: VecDeque::new(),
            retention: config.retention(),
            max_entries: config.max_entries.max(1),
        }
    }

    pub fn has(&self, id: &str) -> bool {
        self.has_at(id, Instant::now())
    }

    pub fn has_at(&self, id: &str, now: Instant) -> bool {
        self.seen
            .get(id)
            .is_some_and(|seen_at| now.saturating_duration_since(*seen_at) < self.retention)
    }

    pub fn mark_seen(&mut self, id: &str) {
        self.mark_seen_at(id, Instant::now());
    }

    /// Records `id` at `now`. An id already tracked keeps its first-seen time.
    pub fn mark_seen_at(&mut self, id: &str, now: Instant) {
        if self.seen.contains_key(id) {
            return;
        }
        while self.seen.len() >= self.max_entries {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.seen.remove(&oldest);
                }
                None => break,
            }
        }
        self.seen.insert(id.to_string(), now);
        self.order.push_back(id.to_string());
    }

    pub fn evict_older_than(&mut self, age: Duration) -> usize {
        self.evict_older_than_at(age, Instant::now())
    }

    /// Drops entries first seen more than `age` before `now`.
    pub fn evict_older_than_at(&mut self, age: Duration, now: Instant) -> usize {
        let before = self.seen.len();
        while let Some(oldest) = self.order.front() {
            let expired = self
                .seen
                .get(oldest)
                .map_or(true, |seen_at| now.saturating_duration_since(*seen_at) > age);
            if !expired {
                break;
            }
            if let Some(id) = self.order.pop_front() {
                self.seen.remove(&id);
            }
        }
        let evicted = before - self.seen.len();
        if evicted > 0 {
            debug!("Evicted {} expired ids from dedup tracker", evicted);
        }
        evicted
    }

    /// Evicts everything past the configured retention.
    pub fn evict_expired(&mut self) -> usize {
        self.evict_older_than(self.retention)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
