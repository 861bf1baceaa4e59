//! In-memory pipeline client.
//!
//! This module provides [`MemoryPipelineClient`], a scripted implementation
//! of [`PipelineClient`] suitable for testing and offline development.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use super::{validate_topic, PipelineClient};
use crate::{Result, SpoolError};

/// A call received by a [`MemoryPipelineClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    /// `list_trends()`
    ListTrends,
    /// `generate_script(topic)`
    GenerateScript(String),
    /// `render_video(topic, final_script)`
    RenderVideo(String, String),
    /// `create_shorts(topic)`
    CreateShorts(String),
}

/// Internal storage for the memory client.
#[derive(Debug, Default)]
struct Script {
    trends: VecDeque<Result<Vec<String>>>,
    scripts: VecDeque<Result<String>>,
    videos: VecDeque<Result<String>>,
    shorts: VecDeque<Result<String>>,
    calls: Vec<RecordedCall>,
}

/// A scripted, in-memory implementation of [`PipelineClient`].
///
/// Outcomes are queued per operation and handed out in order. When a queue
/// is empty the client answers with a fixed default: an empty trend list,
/// a script derived from the topic, or a location under `/results/`.
///
/// Responses can be held back with [`hold`](Self::hold) and let through one
/// at a time with [`release`](Self::release), which makes races between a
/// slow response and a user action deterministic.
///
/// Cloning is cheap; clones share the same queues and call log.
///
/// # Example
///
/// ```
/// use spool::{MemoryPipelineClient, PipelineClient, RecordedCall};
///
/// # async fn example() -> spool::Result<()> {
/// let client = MemoryPipelineClient::new();
/// client.push_video(Ok("/results/x.mp4".to_string()));
///
/// let location = client.render_video("비트코인", "S1").await?;
/// assert_eq!(location, "/results/x.mp4");
/// assert_eq!(
///     client.calls(),
///     vec![RecordedCall::RenderVideo("비트코인".into(), "S1".into())]
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryPipelineClient {
    script: Arc<Mutex<Script>>,
    gate: Arc<Semaphore>,
    held: Arc<AtomicBool>,
    waiting: Arc<AtomicUsize>,
}

impl MemoryPipelineClient {
    /// Creates a client with empty queues that answers immediately.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            gate: Arc::new(Semaphore::new(0)),
            held: Arc::new(AtomicBool::new(false)),
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queues the outcome of the next `list_trends` call.
    pub fn push_trends(&self, outcome: Result<Vec<String>>) {
        self.with_script(|s| s.trends.push_back(outcome));
    }

    /// Queues the outcome of the next `generate_script` call.
    pub fn push_script(&self, outcome: Result<String>) {
        self.with_script(|s| s.scripts.push_back(outcome));
    }

    /// Queues the outcome of the next `render_video` call.
    pub fn push_video(&self, outcome: Result<String>) {
        self.with_script(|s| s.videos.push_back(outcome));
    }

    /// Queues the outcome of the next `create_shorts` call.
    pub fn push_shorts(&self, outcome: Result<String>) {
        self.with_script(|s| s.shorts.push_back(outcome));
    }

    /// Returns every call received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.with_script(|s| s.calls.clone())
    }

    /// Returns how many calls matched `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&RecordedCall) -> bool) -> usize {
        self.with_script(|s| s.calls.iter().filter(|c| predicate(c)).count())
    }

    /// Holds every subsequent response until released.
    ///
    /// Calls are still recorded as soon as they arrive.
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Lets `count` held responses through.
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Stops holding responses and lets every waiting one through.
    pub fn release_all(&self) {
        self.held.store(false, Ordering::SeqCst);
        let waiting = self.waiting.load(Ordering::SeqCst);
        self.gate
            .add_permits(waiting.saturating_sub(self.gate.available_permits()));
    }

    /// Returns how many responses are currently held back.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut script)
    }

    async fn answer<T>(
        &self,
        call: RecordedCall,
        next: impl FnOnce(&mut Script) -> Option<Result<T>>,
        fallback: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let outcome = self.with_script(|s| {
            s.calls.push(call);
            next(s)
        });

        if self.held.load(Ordering::SeqCst) {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let permit = self.gate.acquire().await;
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            permit
                .map_err(|e| SpoolError::Transport(e.to_string()))?
                .forget();
        }

        outcome.unwrap_or_else(fallback)
    }
}

impl Default for MemoryPipelineClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineClient for MemoryPipelineClient {
    async fn list_trends(&self) -> Result<Vec<String>> {
        self.answer(RecordedCall::ListTrends, |s| s.trends.pop_front(), || Ok(Vec::new()))
            .await
    }

    async fn generate_script(&self, topic: &str) -> Result<String> {
        validate_topic(topic)?;
        self.answer(
            RecordedCall::GenerateScript(topic.to_string()),
            |s| s.scripts.pop_front(),
            || Ok(format!("Script about {topic}.")),
        )
        .await
    }

    async fn render_video(&self, topic: &str, final_script: &str) -> Result<String> {
        self.answer(
            RecordedCall::RenderVideo(topic.to_string(), final_script.to_string()),
            |s| s.videos.pop_front(),
            || Ok(format!("/results/shorts_{topic}.mp4")),
        )
        .await
    }

    async fn create_shorts(&self, topic: &str) -> Result<String> {
        self.answer(
            RecordedCall::CreateShorts(topic.to_string()),
            |s| s.shorts.pop_front(),
            || Ok(format!("results/shorts_{topic}.mp4")),
        )
        .await
    }
}
