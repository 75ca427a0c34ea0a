use chrono::{DateTime, Local, NaiveDate, Timelike};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct OperatingHours {
    /// First local hour (0-23) the bot may comment
    pub start: u32,
    /// Local hour at which commenting stops
    pub end: u32,
}

impl OperatingHours {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InteractionLimits {
    pub operating_hours: Option<OperatingHours>,
    pub max_daily_comments: u32,
    pub comment_cooldown_secs: u64,
    pub max_comments_per_post: u32,
}

impl Default for InteractionLimits {
    fn default() -> Self {
        Self {
            operating_hours: None,
            max_daily_comments: 50,
            comment_cooldown_secs: 5 * 60,
            max_comments_per_post: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitViolation {
    #[error("outside operating hours (hour {hour})")]
    OutsideOperatingHours { hour: u32 },

    #[error("daily comment limit reached ({count})")]
    DailyCapReached { count: u32 },

    #[error("cooldown active for another {remaining_secs}s")]
    Cooldown { remaining_secs: i64 },

    #[error("already commented {count} times on post {post_id}")]
    PostCapReached { post_id: String, count: u32 },
}

/// Counters behind [`InteractionLimits`]; they start over each local day.
#[derive(Debug)]
pub struct InteractionTracker {
    limits: InteractionLimits,
    day: NaiveDate,
    daily_comments: u32,
    last_comment_at: Option<DateTime<Local>>,
    comments_per_post: HashMap<String, u32>,
}

impl InteractionTracker {
    pub fn new(limits: InteractionLimits) -> Self {
        Self::starting_at(limits, Local::now())
    }

    pub fn starting_at(limits: InteractionLimits, now: DateTime<Local>) -> Self {
        Self {
            limits,
            day: now.date_naive(),
            daily_comments: 0,
            last_comment_at: None,
            comments_per_post: HashMap::new(),
        }
    }

    pub fn limits(&self) -> &InteractionLimits {
        &self.limits
    }

    fn roll_day(&mut self, now: DateTime<Local>) {
        let today = now.date_naive();
        if today != self.day {
            info!(
                "New day, resetting interaction stats ({} comments yesterday)",
                self.daily_comments
            );
            self.day = today;
            self.daily_comments = 0;
            self.comments_per_post.clear();
        }
    }

    pub fn check(&mut self, post_id: &str) -> Result<(), LimitViolation> {
        self.check_at(post_id, Local::now())
    }

    pub fn check_at(&mut self, post_id: &str, now: DateTime<Local>) -> Result<(), LimitViolation> {
        self.roll_day(now);

        if let Some(hours) = self.limits.operating_hours {
            let hour = now.hour();
            if !hours.contains(hour) {
                return Err(LimitViolation::OutsideOperatingHours { hour });
            }
        }

        if self.daily_comments >= self.limits.max_daily_comments {
            return Err(LimitViolation::DailyCapReached {
                count: self.daily_comments,
            });
        }

        if let Some(last) = self.last_comment_at {
            let elapsed = (now - last).num_seconds();
            let cooldown = self.limits.comment_cooldown_secs as i64;
            if elapsed < cooldown {
                return Err(LimitViolation::Cooldown {
                    remaining_secs: cooldown - elapsed,
                });
            }
        }

        let count = self.comments_per_post.get(post_id).copied().unwrap_or(0);
        if count >= self.limits.max_comments_per_post {
            return Err(LimitViolation::PostCapReached {
                post_id: post_id.to_string(),
                count,
            });
        }

        Ok(())
    }

    pub fn record_comment(&mut self, post_id: &str) {
        self.record_comment_at(post_id, Local::now());
    }

    pub fn record_comment_at(&mut self, post_id: &str, now: DateTime<Local>) {
        self.roll_day(now);
        self.daily_comments += 1;
        self.last_comment_at = Some(now);
        let count = self.comments_per_post.entry(post_id.to_string()).or_insert(0);
        *count += 1;
        debug!(
            "Comment stats: {} today, {} on post {}",
            self.daily_comments, count, post_id
        );
    }

    pub fn daily_comments(&self) -> u32 {
        self.daily_comments
    }
}
