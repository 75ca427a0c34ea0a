use crate::dedup::{DedupConfig, DedupTracker};
use crate::dispatcher::DispatchOutcome;
use crate::safety::SafetyBreaker;
use crate::service::RedditApi;
use agentlink_core::{CoreError, RedditItem};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Time between cycles (in seconds)
    pub interval_secs: u64,
    /// New items handed off per source and cycle; the rest wait
    pub max_items_per_check: usize,
    /// Listing size requested per source
    pub fetch_limit: u32,
    pub check_mentions: bool,
    pub check_inbox: bool,
    /// Also walk the comment thread of every new submission
    pub scan_comments: bool,
    pub comments_limit: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_items_per_check: 25,
            fetch_limit: 100,
            check_mentions: true,
            check_inbox: false,
            scan_comments: false,
            comments_limit: 25,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Receives every new item the poller finds.
#[async_trait]
pub trait ItemSink: Send {
    async fn handle(&mut self, item: RedditItem) -> DispatchOutcome;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub handed_off: usize,
    pub replied: usize,
    pub failed_sources: usize,
    /// Set when a stop request cut the cycle short
    pub interrupted: bool,
    /// Set when the safety breaker was (or became) shut down; items not
    /// handed off stay unseen
    pub halted: bool,
}

impl PollReport {
    fn cut_short(&self) -> bool {
        self.interrupted || self.halted
    }
}

#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    Subreddit(&'a str),
    Thread(&'a str),
    Mentions,
    Inbox,
}

impl std::fmt::Display for Source<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Subreddit(name) => write!(f, "r/{}", name),
            Source::Thread(post_id) => write!(f, "thread {}", post_id),
            Source::Mentions => write!(f, "mentions"),
            Source::Inbox => write!(f, "inbox"),
        }
    }
}

/// Fixed-interval scanner of subreddits, mentions and inbox.
#[derive(Debug)]
pub struct EventPoller {
    config: PollerConfig,
    subreddits: Vec<String>,
    dedup: DedupTracker,
    last_checked: Option<Instant>,
}

impl EventPoller {
    pub fn new(config: PollerConfig, dedup: &DedupConfig, subreddits: Vec<String>) -> Self {
        Self {
            config,
            subreddits,
            dedup: DedupTracker::new(dedup),
            last_checked: None,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn subreddits(&self) -> &[String] {
        &self.subreddits
    }

    pub fn add_subreddit(&mut self, name: &str) {
        if !self.subreddits.iter().any(|s| s.eq_ignore_ascii_case(name)) {
            self.subreddits.push(name.to_string());
        }
    }

    pub fn dedup(&self) -> &DedupTracker {
        &self.dedup
    }

    /// Whether a full interval passed since the previous cycle started.
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_checked
            .map_or(true, |last| now.saturating_duration_since(last) >= self.config.interval())
    }

    /// Runs a cycle unless the previous one started less than an interval ago.
    pub async fn check_for_events<S: ItemSink + ?Sized>(
        &mut self,
        api: &dyn RedditApi,
        safety: &SafetyBreaker,
        sink: &mut S,
        stop: &watch::Receiver<bool>,
    ) -> Option<PollReport> {
        if !self.is_due(Instant::now()) {
            debug!("Skipping check, last cycle was less than {:?} ago", self.config.interval());
            return None;
        }
        Some(self.run_cycle(api, safety, sink, stop).await)
    }

    /// One full pass over every source, ignoring the interval.
    pub async fn run_cycle<S: ItemSink + ?Sized>(
        &mut self,
        api: &dyn RedditApi,
        safety: &SafetyBreaker,
        sink: &mut S,
        stop: &watch::Receiver<bool>,
    ) -> PollReport {
        let mut report = PollReport::default();
        if halt_on_shutdown(safety, &mut report) {
            debug!("Safety shutdown active, skipping cycle");
            return report;
        }

        self.last_checked = Some(Instant::now());
        self.dedup.evict_expired();

        let subreddits = self.subreddits.clone();

        for subreddit in &subreddits {
            if halt_on_shutdown(safety, &mut report) {
                return report;
            }
            let source = Source::Subreddit(subreddit);
            let fetched = api.new_posts(subreddit, self.config.fetch_limit).await;
            let Some(posts) = self.accept(source, fetched, safety, &mut report) else {
                continue;
            };

            let items = posts.into_iter().map(RedditItem::Post).collect();
            let handed = self.hand_off(source, items, sink, safety, stop, &mut report).await;
            if report.cut_short() {
                return report;
            }

            if self.config.scan_comments {
                for post_id in &handed {
                    if halt_on_shutdown(safety, &mut report) {
                        return report;
                    }
                    let thread = Source::Thread(post_id);
                    let fetched = api.post_comments(post_id, self.config.comments_limit).await;
                    let Some(comments) = self.accept(thread, fetched, safety, &mut report) else {
                        continue;
                    };
                    let items = comments.into_iter().map(RedditItem::Comment).collect();
                    self.hand_off(thread, items, sink, safety, stop, &mut report).await;
                    if report.cut_short() {
                        return report;
                    }
                }
            }
        }

        if self.config.check_mentions && !halt_on_shutdown(safety, &mut report) {
            let fetched = api.mentions(self.config.fetch_limit).await;
            if let Some(mentions) = self.accept(Source::Mentions, fetched, safety, &mut report) {
                let items = mentions.into_iter().map(RedditItem::Comment).collect();
                self.hand_off(Source::Mentions, items, sink, safety, stop, &mut report)
                    .await;
                if report.cut_short() {
                    return report;
                }
            }
        }

        if self.config.check_inbox && !halt_on_shutdown(safety, &mut report) {
            let fetched = api.inbox(self.config.fetch_limit).await;
            if let Some(messages) = self.accept(Source::Inbox, fetched, safety, &mut report) {
                let items = messages.into_iter().map(RedditItem::Comment).collect();
                self.hand_off(Source::Inbox, items, sink, safety, stop, &mut report)
                    .await;
            }
        }

        if report.handed_off > 0 || report.failed_sources > 0 {
            info!(
                "Cycle finished: {} new items, {} replies, {} failed sources",
                report.handed_off, report.replied, report.failed_sources
            );
        }
        report
    }

    fn accept<T>(
        &self,
        source: Source<'_>,
        fetched: Result<Vec<T>, CoreError>,
        safety: &SafetyBreaker,
        report: &mut PollReport,
    ) -> Option<Vec<T>> {
        match fetched {
            Ok(items) => Some(items),
            Err(e) => {
                warn!("Failed to fetch {}: {}", source, e);
                safety.record_error(&format!("fetch {}", source));
                report.failed_sources += 1;
                None
            }
        }
    }

    /// Marks up to `max_items_per_check` unseen items and passes them on.
    /// Returns the ids that were handed off.
    async fn hand_off<S: ItemSink + ?Sized>(
        &mut self,
        source: Source<'_>,
        items: Vec<RedditItem>,
        sink: &mut S,
        safety: &SafetyBreaker,
        stop: &watch::Receiver<bool>,
        report: &mut PollReport,
    ) -> Vec<String> {
        let fresh: Vec<RedditItem> = items
            .into_iter()
            .filter(|item| !self.dedup.has(item.id()))
            .collect();
        let waiting = fresh.len().saturating_sub(self.config.max_items_per_check);
        if waiting > 0 {
            debug!(
                "{}: {} new items over the per-check cap, deferring to next cycle",
                source, waiting
            );
        }

        let mut handed = Vec::new();
        for item in fresh.into_iter().take(self.config.max_items_per_check) {
            if *stop.borrow() {
                info!("Stop requested, abandoning rest of cycle");
                report.interrupted = true;
                break;
            }
            if safety.is_shutdown() {
                info!("Safety shutdown, leaving remaining items of {} unseen", source);
                report.halted = true;
                break;
            }
            self.dedup.mark_seen(item.id());
            handed.push(item.id().to_string());
            report.handed_off += 1;

            if let DispatchOutcome::Replied { .. } = sink.handle(item).await {
                report.replied += 1;
            }
        }
        handed
    }
}

fn halt_on_shutdown(safety: &SafetyBreaker, report: &mut PollReport) -> bool {
    if safety.is_shutdown() {
        report.halted = true;
    }
    report.halted
}
