//! Trend suggestions.
//!
//! A [`TrendCache`] holds the latest [`TrendSuggestions`] snapshot. It has its
//! own lifecycle, separate from the workflow store: fetching never waits on a
//! pipeline stage and a stage never waits on a fetch. Each completed fetch
//! replaces the snapshot wholesale, so overlapping fetches resolve as last
//! write wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// The state of the most recent trend fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrendStatus {
    /// Nothing has been fetched yet.
    #[default]
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The topics reflect a successful fetch.
    Ready,
    /// The latest fetch failed.
    Failed,
}

/// A snapshot of candidate topics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrendSuggestions {
    /// Topics in the order the feed returned them.
    pub topics: Vec<String>,
    /// When the topics were fetched.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Status of the latest fetch.
    pub status: TrendStatus,
    /// Failure message of the latest fetch. Older topics are kept.
    pub error: Option<String>,
}

impl TrendSuggestions {
    /// Returns the topic at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.topics.get(index).map(String::as_str)
    }

    /// Returns true if there are no topics.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Observable holder of the current [`TrendSuggestions`].
///
/// Cloning is cheap; clones share the same snapshot.
#[derive(Debug, Clone)]
pub struct TrendCache {
    inner: Arc<watch::Sender<TrendSuggestions>>,
}

impl TrendCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(TrendSuggestions::default());
        Self {
            inner: Arc::new(tx),
        }
    }

    /// Returns a copy of the current snapshot.
    pub fn snapshot(&self) -> TrendSuggestions {
        self.inner.borrow().clone()
    }

    /// Subscribes to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<TrendSuggestions> {
        self.inner.subscribe()
    }

    /// Marks a fetch as in flight. Existing topics stay visible.
    pub fn begin(&self) {
        self.inner.send_modify(|trends| {
            trends.status = TrendStatus::Loading;
        });
    }

    /// Replaces the topics with a fresh fetch result.
    pub fn complete(&self, topics: Vec<String>) {
        self.inner.send_modify(|trends| {
            trends.topics = topics;
            trends.fetched_at = Some(Utc::now());
            trends.status = TrendStatus::Ready;
            trends.error = None;
        });
    }

    /// Records a failed fetch.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.inner.send_modify(|trends| {
            trends.status = TrendStatus::Failed;
            trends.error = Some(message);
        });
    }

    /// Returns the topic at `index` of the current snapshot.
    pub fn topic(&self, index: usize) -> Option<String> {
        self.inner.borrow().get(index).map(str::to_string)
    }
}

impl Default for TrendCache {
    fn default() -> Self {
        Self::new()
    }
}
