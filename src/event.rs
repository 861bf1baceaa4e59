//! Pipeline events.
//!
//! [`Event`] is everything that can be fed into the engine: user intents
//! and the epoch-tagged responses of remote calls. [`Notification`] is what
//! comes back out, broadcast to subscribers for logging or building UIs.

use url::Url;

use crate::trends::TrendStatus;
use crate::{SpoolError, Stage};

/// The failure carried by a response event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Message shown to the user.
    pub message: String,
    /// Whether the same inputs may succeed later.
    pub retryable: bool,
}

impl Failure {
    /// Creates a failure.
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            retryable,
        }
    }
}

impl From<&SpoolError> for Failure {
    fn from(error: &SpoolError) -> Self {
        Self::new(error.to_string(), error.is_retryable())
    }
}

impl From<SpoolError> for Failure {
    fn from(error: SpoolError) -> Self {
        Self::from(&error)
    }
}

/// An input to the stage transition engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The user typed or picked a topic.
    EditTopic(String),

    /// The user asked for a script for a topic.
    SubmitTopic(String),

    /// The script request succeeded.
    ScriptReady {
        /// Epoch the request was issued under.
        epoch: u64,
        /// The drafted script.
        script: String,
    },

    /// The script request failed.
    ScriptFailed {
        /// Epoch the request was issued under.
        epoch: u64,
        /// What went wrong.
        failure: Failure,
    },

    /// The user edited the draft in place.
    EditScript(String),

    /// The user abandoned the draft to pick another topic.
    BackToTopic,

    /// The user approved a script for rendering.
    SubmitVideo {
        /// The topic the script belongs to.
        topic: String,
        /// The approved script.
        final_script: String,
    },

    /// The render request succeeded.
    VideoReady {
        /// Epoch the request was issued under.
        epoch: u64,
        /// Absolute location of the video.
        location: Url,
    },

    /// The render request failed.
    VideoFailed {
        /// Epoch the request was issued under.
        epoch: u64,
        /// What went wrong.
        failure: Failure,
    },

    /// Start over from an idle pipeline.
    Reset,

    /// Replay the request that led to the failure.
    Retry,
}

impl Event {
    /// Returns the event name, used in logs and notifications.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EditTopic(_) => "edit_topic",
            Self::SubmitTopic(_) => "submit_topic",
            Self::ScriptReady { .. } => "script_ready",
            Self::ScriptFailed { .. } => "script_failed",
            Self::EditScript(_) => "edit_script",
            Self::BackToTopic => "back_to_topic",
            Self::SubmitVideo { .. } => "submit_video",
            Self::VideoReady { .. } => "video_ready",
            Self::VideoFailed { .. } => "video_failed",
            Self::Reset => "reset",
            Self::Retry => "retry",
        }
    }

    /// Returns the epoch a response event was issued under.
    ///
    /// User intents carry no epoch.
    pub fn response_epoch(&self) -> Option<u64> {
        match self {
            Self::ScriptReady { epoch, .. }
            | Self::ScriptFailed { epoch, .. }
            | Self::VideoReady { epoch, .. }
            | Self::VideoFailed { epoch, .. } => Some(*epoch),
            _ => None,
        }
    }
}

/// A record of a dispatch outcome, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Notification {
    /// An event was applied.
    Transitioned {
        /// Stage before the event.
        from: Stage,
        /// Stage after the event.
        to: Stage,
        /// Epoch after the event.
        epoch: u64,
    },

    /// A remote call was issued.
    CallIssued {
        /// Epoch the call is tagged with.
        epoch: u64,
        /// The remote operation name.
        call: &'static str,
    },

    /// A response from a superseded request was dropped.
    ResponseDiscarded {
        /// Epoch the response was issued under.
        response_epoch: u64,
        /// Epoch of the store when it arrived.
        current_epoch: u64,
    },

    /// An event was not legal in the current stage.
    EventIgnored {
        /// Stage at the time of the event.
        stage: Stage,
        /// The event name.
        event: &'static str,
    },

    /// An event was refused because its input was invalid.
    EventRejected {
        /// Stage at the time of the event.
        stage: Stage,
        /// Why the input was refused.
        reason: String,
    },

    /// The trend suggestions changed.
    TrendsUpdated {
        /// The new fetch status.
        status: TrendStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_from_error() {
        let failure = Failure::from(SpoolError::service("실패"));
        assert_eq!(failure.message, "실패");
        assert!(failure.retryable);

        let failure = Failure::from(&SpoolError::rejected("no"));
        assert!(!failure.retryable);
    }

    #[test]
    fn test_response_epoch() {
        let event = Event::ScriptReady {
            epoch: 3,
            script: "S1".to_string(),
        };
        assert_eq!(event.response_epoch(), Some(3));

        assert_eq!(Event::Reset.response_epoch(), None);
        assert_eq!(Event::SubmitTopic("x".to_string()).response_epoch(), None);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(Event::BackToTopic.name(), "back_to_topic");
        assert_eq!(Event::Retry.name(), "retry");
        assert_eq!(
            Event::SubmitVideo {
                topic: "t".to_string(),
                final_script: "s".to_string(),
            }
            .name(),
            "submit_video"
        );
    }
}
