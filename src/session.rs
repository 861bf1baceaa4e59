//! The session controller.
//!
//! A [`Session`] ties together one [`WorkflowStore`], one [`TrendCache`] and
//! one [`PipelineClient`]. All changes to the workflow go through
//! [`Session::dispatch`]; remote calls run on spawned tasks and feed their
//! result back in as an epoch-tagged response event.

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;

use crate::client::{resolve_legacy_file, resolve_location, validate_topic};
use crate::engine::Command;
use crate::status::PipelineStatus;
use crate::store::{Applied, WorkflowStore};
use crate::trends::{TrendCache, TrendStatus, TrendSuggestions};
use crate::{
    Config, Event, Failure, Notification, PipelineClient, RemoteRequest, Result, SpoolError,
    WorkflowState,
};

/// The result of [`Session::dispatch`].
#[derive(Debug)]
pub enum Dispatched {
    /// The event was applied.
    Applied {
        /// The remote call the transition started, if any.
        call: Option<JoinHandle<()>>,
    },
    /// The event was not legal in the current stage.
    Ignored,
    /// The event's input was invalid; the message is meant for the user.
    Rejected(String),
    /// The event was a response to a superseded request.
    Discarded,
}

impl Dispatched {
    /// Returns true if the event changed the state.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Returns the handle of the remote call the event started, if any.
    pub fn into_call(self) -> Option<JoinHandle<()>> {
        match self {
            Self::Applied { call } => call,
            _ => None,
        }
    }

    /// Waits for the remote call the event started, if any.
    ///
    /// Returns once the call's response has been dispatched.
    pub async fn settle(self) {
        if let Some(call) = self.into_call() {
            if let Err(e) = call.await {
                warn!(error = %e, "remote call task did not finish");
            }
        }
    }
}

/// One user's pipeline.
///
/// Cloning is cheap; clones drive the same pipeline.
///
/// # Example
///
/// ```
/// use spool::{Config, MemoryPipelineClient, Session, Stage};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let client = MemoryPipelineClient::new();
/// client.push_script(Ok("S1".to_string()));
///
/// let session = Session::new(Config::default(), Arc::new(client));
/// session.submit_topic("비트코인").settle().await;
///
/// let state = session.state();
/// assert_eq!(state.stage, Stage::AwaitingScriptEdit);
/// assert_eq!(state.script_draft.as_deref(), Some("S1"));
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    config: Arc<Config>,
    client: Arc<dyn PipelineClient>,
    store: WorkflowStore,
    trends: TrendCache,
}

impl Session {
    /// Creates a session in the idle stage.
    pub fn new(config: Config, client: Arc<dyn PipelineClient>) -> Self {
        let store = WorkflowStore::new(config.event_capacity);
        Self {
            config: Arc::new(config),
            client,
            store,
            trends: TrendCache::new(),
        }
    }

    /// Creates a session talking to the service over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    #[cfg(feature = "http")]
    pub fn connect(config: Config) -> Result<Self> {
        let client = crate::HttpPipelineClient::new(&config)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a copy of the current workflow state.
    pub fn state(&self) -> WorkflowState {
        self.store.snapshot()
    }

    /// Returns a copy of the current trend suggestions.
    pub fn trends(&self) -> TrendSuggestions {
        self.trends.snapshot()
    }

    /// Returns a renderable summary of the pipeline.
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus::from_state(&self.store.snapshot())
    }

    /// Subscribes to workflow state changes.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.store.subscribe()
    }

    /// Subscribes to trend suggestion changes.
    pub fn subscribe_trends(&self) -> watch::Receiver<TrendSuggestions> {
        self.trends.subscribe()
    }

    /// Subscribes to dispatch notifications.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.store.notifications()
    }

    /// Applies an event and starts the remote call it initiates, if any.
    ///
    /// This is the single entry point for changing the workflow.
    ///
    /// Remote calls are spawned on the current Tokio runtime. Without one,
    /// the call fails at once and the pipeline moves to
    /// [`Stage::Failed`](crate::Stage::Failed) with a retryable error.
    pub fn dispatch(&self, event: Event) -> Dispatched {
        let span = info_span!("dispatch", event = event.name());
        let _enter = span.enter();

        match self.store.apply(event) {
            Applied::Transitioned { command, .. } => Dispatched::Applied {
                call: command.and_then(|command| self.issue(command)),
            },
            Applied::Ignored => Dispatched::Ignored,
            Applied::Rejected(reason) => Dispatched::Rejected(reason),
            Applied::Discarded => Dispatched::Discarded,
        }
    }

    /// Sets the topic while the pipeline is idle.
    pub fn edit_topic(&self, topic: impl Into<String>) -> Dispatched {
        self.dispatch(Event::EditTopic(topic.into()))
    }

    /// Starts drafting a script for `topic`.
    pub fn submit_topic(&self, topic: impl Into<String>) -> Dispatched {
        self.dispatch(Event::SubmitTopic(topic.into()))
    }

    /// Replaces the draft while it is under review.
    pub fn edit_script(&self, text: impl Into<String>) -> Dispatched {
        self.dispatch(Event::EditScript(text.into()))
    }

    /// Abandons the draft and returns to topic selection.
    pub fn back_to_topic(&self) -> Dispatched {
        self.dispatch(Event::BackToTopic)
    }

    /// Starts rendering `final_script` for `topic`.
    pub fn submit_video(
        &self,
        topic: impl Into<String>,
        final_script: impl Into<String>,
    ) -> Dispatched {
        self.dispatch(Event::SubmitVideo {
            topic: topic.into(),
            final_script: final_script.into(),
        })
    }

    /// Starts rendering the current topic and draft as they stand.
    pub fn submit_draft(&self) -> Dispatched {
        let state = self.store.snapshot();
        let draft = state.draft().to_string();
        self.submit_video(state.topic, draft)
    }

    /// Returns the pipeline to idle, abandoning any outstanding call.
    pub fn reset(&self) -> Dispatched {
        self.dispatch(Event::Reset)
    }

    /// Replays the request that failed under a new epoch.
    pub fn retry(&self) -> Dispatched {
        self.dispatch(Event::Retry)
    }

    /// Copies the trend suggestion at `index` into the topic.
    ///
    /// Only takes effect while the pipeline is idle; otherwise, or for an
    /// index past the end of the list, nothing changes.
    pub fn select_trend(&self, index: usize) -> Dispatched {
        match self.trends.topic(index) {
            Some(topic) => self.edit_topic(topic),
            None => {
                debug!(index, "no trend suggestion at index");
                Dispatched::Ignored
            }
        }
    }

    /// Refreshes the trend suggestions.
    ///
    /// Runs independently of the workflow; it may be awaited while a stage
    /// is in flight. Failures are recorded in the suggestions and returned.
    ///
    /// # Errors
    ///
    /// Returns the client error if the fetch failed.
    pub async fn fetch_trends(&self) -> Result<()> {
        let span = info_span!("fetch_trends");
        async {
            self.trends.begin();
            self.store.emit(Notification::TrendsUpdated {
                status: TrendStatus::Loading,
            });

            let result = self.client.list_trends().await;
            let status = match &result {
                Ok(topics) => {
                    info!(count = topics.len(), "trend suggestions refreshed");
                    self.trends.complete(topics.clone());
                    TrendStatus::Ready
                }
                Err(e) => {
                    warn!(error = %e, "trend fetch failed");
                    self.trends.fail(e.to_string());
                    TrendStatus::Failed
                }
            };
            self.store.emit(Notification::TrendsUpdated { status });
            result.map(|_| ())
        }
        .instrument(span)
        .await
    }

    /// Runs the legacy single-call path and returns the video URL.
    ///
    /// This bypasses the staged workflow entirely and leaves the session
    /// state untouched.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank topic, the client error if the
    /// call failed, or [`SpoolError::InvalidLocation`](crate::SpoolError::InvalidLocation)
    /// if the returned path has no file name.
    pub async fn create_shorts_legacy(&self, topic: &str) -> Result<Url> {
        validate_topic(topic)?;
        let span = info_span!("create_shorts", %topic);
        async {
            let file = self.client.create_shorts(topic).await.map_err(|e| {
                warn!(error = %e, "legacy create-shorts failed");
                e
            })?;
            let url = resolve_legacy_file(&self.config.base_url, &file)?;
            info!(%url, "legacy shorts ready");
            Ok(url)
        }
        .instrument(span)
        .await
    }

    /// Spawns the remote call for `command`.
    ///
    /// Returns `None` if there is no runtime to run it on; the failure has
    /// then already been dispatched.
    fn issue(&self, command: Command) -> Option<JoinHandle<()>> {
        let span = info_span!(
            "remote_call",
            epoch = command.epoch,
            call = command.request.name()
        );

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(parent: &span, error = %e, "no runtime to run remote call on");
                let error = SpoolError::Transport(format!("no async runtime: {e}"));
                self.dispatch(command.failure(Failure::from(error)));
                return None;
            }
        };

        let session = self.clone();
        Some(
            runtime.spawn(
                async move {
                    let response = session.execute(command).await;
                    session.dispatch(response);
                }
                .instrument(span),
            ),
        )
    }

    /// Performs a remote call and turns its outcome into a response event.
    async fn execute(&self, command: Command) -> Event {
        let Command { epoch, request } = command;
        info!("issuing remote call");

        match request {
            RemoteRequest::GenerateScript { topic } => {
                match self.client.generate_script(&topic).await {
                    Ok(script) => Event::ScriptReady { epoch, script },
                    Err(e) => {
                        warn!(error = %e, "script drafting failed");
                        Event::ScriptFailed {
                            epoch,
                            failure: Failure::from(e),
                        }
                    }
                }
            }
            RemoteRequest::RenderVideo {
                topic,
                final_script,
            } => {
                let location = self
                    .client
                    .render_video(&topic, &final_script)
                    .await
                    .and_then(|location| resolve_location(&self.config.base_url, &location));
                match location {
                    Ok(location) => Event::VideoReady { epoch, location },
                    Err(e) => {
                        warn!(error = %e, "video rendering failed");
                        Event::VideoFailed {
                            epoch,
                            failure: Failure::from(e),
                        }
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.config.base_url.as_str())
            .field("stage", &self.store.stage())
            .field("epoch", &self.store.epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryPipelineClient, RecordedCall, SpoolError, Stage};

    fn session_with(client: &MemoryPipelineClient) -> Session {
        Session::new(Config::default(), Arc::new(client.clone()))
    }

    #[tokio::test]
    async fn test_submit_topic_drafts_script() {
        let client = MemoryPipelineClient::new();
        client.push_script(Ok("S1".to_string()));
        let session = session_with(&client);

        session.submit_topic("cats").settle().await;

        let state = session.state();
        assert_eq!(state.stage, Stage::AwaitingScriptEdit);
        assert_eq!(state.draft(), "S1");
        assert_eq!(
            client.calls(),
            vec![RecordedCall::GenerateScript("cats".to_string())]
        );
    }

    #[tokio::test]
    async fn test_blank_topic_is_rejected_without_call() {
        let client = MemoryPipelineClient::new();
        let session = session_with(&client);

        let dispatched = session.submit_topic("  ");
        assert!(matches!(dispatched, Dispatched::Rejected(_)));
        assert_eq!(session.state().stage, Stage::Idle);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_location_fails_render() {
        let client = MemoryPipelineClient::new();
        client.push_video(Ok("   ".to_string()));
        let session = session_with(&client);

        session.submit_topic("cats").settle().await;
        session.submit_draft().settle().await;

        let state = session.state();
        assert_eq!(state.stage, Stage::Failed);
        assert!(state.video_location.is_none());
        let record = state.error_detail.unwrap();
        assert_eq!(record.stage, Stage::Rendering);
        assert!(record.retryable);
    }

    #[tokio::test]
    async fn test_submit_draft_uses_current_topic_and_draft() {
        let client = MemoryPipelineClient::new();
        client.push_script(Ok("S1".to_string()));
        let session = session_with(&client);

        session.submit_topic("cats").settle().await;
        session.edit_script("S1 edited");
        session.submit_draft().settle().await;

        assert_eq!(
            client.calls().last(),
            Some(&RecordedCall::RenderVideo(
                "cats".to_string(),
                "S1 edited".to_string()
            ))
        );
        assert_eq!(session.state().stage, Stage::Ready);
    }

    #[tokio::test]
    async fn test_non_http_location_fails_render() {
        for location in ["C:\\app\\results\\x.mp4", "file:///etc/passwd"] {
            let client = MemoryPipelineClient::new();
            client.push_video(Ok(location.to_string()));
            let session = session_with(&client);

            session.submit_topic("cats").settle().await;
            session.submit_draft().settle().await;

            let state = session.state();
            assert_eq!(state.stage, Stage::Failed, "{location}");
            assert!(state.video_location.is_none());
            assert_eq!(state.error_detail.unwrap().stage, Stage::Rendering);
        }
    }

    #[test]
    fn test_submit_without_runtime_fails_instead_of_panicking() {
        let client = MemoryPipelineClient::new();
        let session = session_with(&client);

        let dispatched = session.submit_topic("cats");
        assert!(dispatched.is_applied());
        assert!(dispatched.into_call().is_none());

        let state = session.state();
        assert_eq!(state.stage, Stage::Failed);
        let record = state.error_detail.unwrap();
        assert_eq!(record.stage, Stage::Drafting);
        assert!(record.retryable);
        assert!(client.calls().is_empty());

        assert!(session.reset().is_applied());
        assert_eq!(session.state().stage, Stage::Idle);
    }

    #[tokio::test]
    async fn test_fetch_trends_failure_is_recorded() {
        let client = MemoryPipelineClient::new();
        client.push_trends(Err(SpoolError::Transport("offline".to_string())));
        let session = session_with(&client);

        assert!(session.fetch_trends().await.is_err());
        let trends = session.trends();
        assert_eq!(trends.status, TrendStatus::Failed);
        assert!(trends.error.unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn test_select_trend_out_of_range_is_ignored() {
        let client = MemoryPipelineClient::new();
        let session = session_with(&client);
        assert!(matches!(session.select_trend(3), Dispatched::Ignored));
    }

    #[tokio::test]
    async fn test_legacy_create_shorts_resolves_file() {
        let client = MemoryPipelineClient::new();
        client.push_shorts(Ok("results\\shorts_cats.mp4".to_string()));
        let session = session_with(&client);

        let url = session.create_shorts_legacy("cats").await.unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/results/shorts_cats.mp4");
        assert_eq!(session.state().stage, Stage::Idle);
    }

    #[tokio::test]
    async fn test_legacy_create_shorts_surfaces_service_message() {
        let client = MemoryPipelineClient::new();
        client.push_shorts(Err(SpoolError::service("영상 소스 없음")));
        let session = session_with(&client);

        let error = session.create_shorts_legacy("cats").await.unwrap_err();
        assert_eq!(error.to_string(), "영상 소스 없음");
    }

    #[tokio::test]
    async fn test_debug_output() {
        let session = session_with(&MemoryPipelineClient::new());
        let debug = format!("{session:?}");
        assert!(debug.contains("Session"));
        assert!(debug.contains("Idle"));
    }
}
