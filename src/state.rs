//! The workflow state held by a session.
//!
//! [`WorkflowState`] is the single pipeline instance. It is only ever
//! replaced by the engine (see [`crate::engine::step`]) so its invariants
//! hold after every applied event:
//!
//! - `video_location` is set if and only if the stage is [`Stage::Ready`]
//! - `error_detail` is set if and only if the stage is [`Stage::Failed`]
//! - entering [`Stage::Idle`] clears the draft, location, error and the
//!   remembered request

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ErrorRecord, Stage};

/// The inputs of a stage-initiating remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteRequest {
    /// Draft a script for a topic.
    GenerateScript {
        /// The topic to write about.
        topic: String,
    },

    /// Render a reviewed script into a video.
    RenderVideo {
        /// The topic the script was written for.
        topic: String,
        /// The script as approved by the user.
        final_script: String,
    },
}

impl RemoteRequest {
    /// Returns the remote operation name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GenerateScript { .. } => "generate_script",
            Self::RenderVideo { .. } => "render_video",
        }
    }

    /// Returns the stage that owns this call while it is outstanding.
    pub fn stage(&self) -> Stage {
        match self {
            Self::GenerateScript { .. } => Stage::Drafting,
            Self::RenderVideo { .. } => Stage::Rendering,
        }
    }

    /// Returns the topic the call was issued for.
    pub fn topic(&self) -> &str {
        match self {
            Self::GenerateScript { topic } | Self::RenderVideo { topic, .. } => topic,
        }
    }
}

/// The state of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Current stage.
    pub stage: Stage,

    /// The user-supplied topic.
    pub topic: String,

    /// The script draft, present from [`Stage::AwaitingScriptEdit`] onward.
    pub script_draft: Option<String>,

    /// Absolute location of the finished video.
    pub video_location: Option<Url>,

    /// Failure details while in [`Stage::Failed`].
    pub error_detail: Option<ErrorRecord>,

    /// Generation token compared against every response.
    pub epoch: u64,

    /// Inputs of the most recent stage-initiating call, replayed by retry.
    pub last_request: Option<RemoteRequest>,

    /// When the last transition was applied.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Creates the initial, idle state.
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            topic: String::new(),
            script_draft: None,
            video_location: None,
            error_detail: None,
            epoch: 0,
            last_request: None,
            updated_at: Utc::now(),
        }
    }

    /// Returns the current draft, or an empty string when there is none.
    pub fn draft(&self) -> &str {
        self.script_draft.as_deref().unwrap_or_default()
    }

    /// Returns true if the stored fields agree with the stage.
    pub fn is_consistent(&self) -> bool {
        let location_ok = self.video_location.is_some() == (self.stage == Stage::Ready);
        let error_ok = self.error_detail.is_some() == (self.stage == Stage::Failed);
        let idle_ok = self.stage != Stage::Idle
            || (self.script_draft.is_none() && self.last_request.is_none());
        location_ok && error_ok && idle_ok
    }

    /// Returns this state moved back to idle.
    ///
    /// The topic and epoch are kept; everything derived from a job is
    /// cleared.
    pub(crate) fn into_idle(mut self) -> Self {
        self.stage = Stage::Idle;
        self.script_draft = None;
        self.video_location = None;
        self.error_detail = None;
        self.last_request = None;
        self
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}
