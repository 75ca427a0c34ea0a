use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Warnings within one window that move the breaker to `Warned`
    pub warning_threshold: u32,
    /// Errors within one window that move the breaker to `Shutdown`
    pub error_threshold: u32,
    /// Quiet period after which counters start over (in seconds)
    pub reset_interval_secs: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 5,
            error_threshold: 10,
            reset_interval_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyState {
    Normal,
    Warned,
    Shutdown,
}

impl fmt::Display for SafetyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyState::Normal => write!(f, "normal"),
            SafetyState::Warned => write!(f, "warned"),
            SafetyState::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    /// Trips the breaker regardless of counters.
    Fatal,
}

#[derive(Debug, Clone)]
pub struct SafetySnapshot {
    pub state: SafetyState,
    pub warnings: u32,
    pub errors: u32,
    pub last_violation: Option<Instant>,
}

#[derive(Debug)]
struct BreakerInner {
    state: SafetyState,
    warnings: u32,
    errors: u32,
    window_start: Instant,
    last_violation: Option<Instant>,
    blocked_posts: HashSet<String>,
    blocked_users: HashSet<String>,
    topic_violations: HashMap<String, u32>,
}

/// Escalating guard over outbound actions: `Normal -> Warned -> Shutdown`.
///
/// `Shutdown` only clears through [`SafetyBreaker::reset`].
#[derive(Debug)]
pub struct SafetyBreaker {
    config: SafetyConfig,
    inner: Mutex<BreakerInner>,
}

impl SafetyBreaker {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: SafetyState::Normal,
                warnings: 0,
                errors: 0,
                window_start: Instant::now(),
                last_violation: None,
                blocked_posts: HashSet::new(),
                blocked_users: HashSet::new(),
                topic_violations: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.config.reset_interval_secs)
    }

    /// Starts a fresh window once no violation arrived for a full interval.
    fn roll_window(&self, inner: &mut BreakerInner, now: Instant) {
        if inner.state == SafetyState::Shutdown {
            return;
        }
        let quiet_since = inner.last_violation.unwrap_or(inner.window_start);
        if now.saturating_duration_since(quiet_since) < self.reset_interval() {
            return;
        }
        if inner.warnings > 0 || inner.errors > 0 || inner.state != SafetyState::Normal {
            info!(
                "Safety window elapsed, clearing {} warnings and {} errors",
                inner.warnings, inner.errors
            );
        }
        inner.state = SafetyState::Normal;
        inner.warnings = 0;
        inner.errors = 0;
        inner.window_start = now;
        inner.topic_violations.clear();
    }

    pub fn state(&self) -> SafetyState {
        self.state_at(Instant::now())
    }

    pub fn state_at(&self, now: Instant) -> SafetyState {
        let mut inner = self.lock();
        self.roll_window(&mut inner, now);
        inner.state
    }

    pub fn is_shutdown(&self) -> bool {
        self.state() == SafetyState::Shutdown
    }

    pub fn snapshot(&self) -> SafetySnapshot {
        let mut inner = self.lock();
        self.roll_window(&mut inner, Instant::now());
        SafetySnapshot {
            state: inner.state,
            warnings: inner.warnings,
            errors: inner.errors,
            last_violation: inner.last_violation,
        }
    }

    pub fn record(&self, severity: Severity, reason: &str) -> SafetyState {
        self.record_at(severity, reason, Instant::now())
    }

    pub fn record_at(&self, severity: Severity, reason: &str, now: Instant) -> SafetyState {
        let mut inner = self.lock();
        self.roll_window(&mut inner, now);
        inner.last_violation = Some(now);

        match severity {
            Severity::Warning => inner.warnings += 1,
            Severity::Error | Severity::Fatal => inner.errors += 1,
        }

        if inner.state == SafetyState::Shutdown {
            debug!("Violation while shut down ({:?}): {}", severity, reason);
            return inner.state;
        }

        let trips = severity == Severity::Fatal || inner.errors >= self.config.error_threshold;
        if trips {
            inner.state = SafetyState::Shutdown;
            error!(
                "Safety shutdown after {:?} ({} errors, {} warnings): {}",
                severity, inner.errors, inner.warnings, reason
            );
        } else if inner.state == SafetyState::Normal
            && inner.warnings >= self.config.warning_threshold
        {
            inner.state = SafetyState::Warned;
            warn!(
                "Safety warning threshold reached ({} warnings): {}",
                inner.warnings, reason
            );
        } else {
            debug!("Recorded {:?} violation: {}", severity, reason);
        }
        inner.state
    }

    pub fn record_warning(&self, reason: &str) -> SafetyState {
        self.record(Severity::Warning, reason)
    }

    pub fn record_error(&self, reason: &str) -> SafetyState {
        self.record(Severity::Error, reason)
    }

    pub fn record_fatal(&self, reason: &str) -> SafetyState {
        self.record(Severity::Fatal, reason)
    }

    /// Operator reset: clears counters and reopens the breaker.
    pub fn reset(&self) {
        let mut inner = self.lock();
        info!(
            "Safety breaker reset from {} ({} warnings, {} errors)",
            inner.state, inner.warnings, inner.errors
        );
        inner.state = SafetyState::Normal;
        inner.warnings = 0;
        inner.errors = 0;
        inner.window_start = Instant::now();
        inner.last_violation = None;
        inner.topic_violations.clear();
    }

    pub fn block_post(&self, post_id: &str) {
        self.lock().blocked_posts.insert(post_id.to_string());
    }

    pub fn is_post_blocked(&self, post_id: &str) -> bool {
        self.lock().blocked_posts.contains(post_id)
    }

    pub fn block_user(&self, username: &str) {
        self.lock()
            .blocked_users
            .insert(username.to_ascii_lowercase());
    }

    pub fn is_user_blocked(&self, username: &str) -> bool {
        self.lock()
            .blocked_users
            .contains(&username.to_ascii_lowercase())
    }

    pub fn record_topic_violation(&self, subreddit: &str) -> u32 {
        let mut inner = self.lock();
        let count = inner
            .topic_violations
            .entry(subreddit.to_ascii_lowercase())
            .or_insert(0);
        *count += 1;
        *count
    }

    pub fn topic_violations(&self, subreddit: &str) -> u32 {
        self.lock()
            .topic_violations
            .get(&subreddit.to_ascii_lowercase())
            .copied()
            .unwrap_or(0)
    }
}
