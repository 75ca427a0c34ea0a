//! Reddit adapter for agent runtimes.
//!
//! A [`RedditClient`] watches subreddits, mentions and the inbox on a fixed
//! interval, filters what it already saw, and lets the runtime decide and
//! write replies. Subreddit rules, interaction limits and a safety breaker
//! sit between the runtime and every outbound comment.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod dedup;
pub mod dispatcher;
pub mod environment;
pub mod limits;
pub mod poller;
pub mod policy;
pub mod rate_limiter;
pub mod retry;
pub mod safety;
pub mod service;

#[cfg(test)]
mod testing;

pub use client::RedditClient;
pub use config::RedditClientConfig;
pub use dispatcher::{ActionDispatcher, DispatchOutcome, ErrorReply, SkipReason};
pub use environment::RedditEnv;
pub use poller::{EventPoller, ItemSink, PollReport, PollerConfig};
pub use policy::{PolicyViolation, SubredditConfig, SubredditPolicies};
pub use safety::{SafetyBreaker, SafetyConfig, SafetyState, Severity};
pub use service::{RedditApi, RedditService};
