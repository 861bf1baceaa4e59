//! Stage types for the Spool pipeline.
//!
//! This module defines [`Stage`], the named phase a pipeline is in, and
//! [`ErrorRecord`], the structured description of a failed stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The phase of the pipeline.
///
/// The stage decides which events are currently legal. `Idle` is both the
/// initial stage and the only stage reachable by a reset. `Ready` and `Failed`
/// are terminal only until a reset or retry arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Stage {
    /// Waiting for a topic.
    #[default]
    Idle,

    /// A script is being generated for the topic.
    Drafting,

    /// A draft script is available and paused for human review.
    AwaitingScriptEdit,

    /// The final script is being rendered into a video.
    Rendering,

    /// The video is available.
    Ready,

    /// The last remote call failed.
    Failed,
}

impl Stage {
    /// Returns true if this stage owns an outstanding remote call.
    pub fn is_issuing(&self) -> bool {
        matches!(self, Self::Drafting | Self::Rendering)
    }

    /// Returns true if a stage-initiating event may be submitted from here.
    pub fn accepts_submission(&self) -> bool {
        matches!(self, Self::Idle | Self::AwaitingScriptEdit)
    }

    /// Returns the stage name as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Drafting => "drafting",
            Self::AwaitingScriptEdit => "awaiting_script_edit",
            Self::Rendering => "rendering",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of a failed stage.
///
/// Drives both the retry policy and the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// The stage whose remote call failed.
    pub stage: Stage,

    /// Human-readable failure message.
    pub message: String,

    /// Whether replaying the same inputs may succeed.
    pub retryable: bool,
}

impl ErrorRecord {
    /// Creates a new error record.
    pub fn new(stage: Stage, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            stage,
            message: message.into(),
            retryable,
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stage_is_idle() {
        assert_eq!(Stage::default(), Stage::Idle);
    }

    #[test]
    fn test_issuing_stages() {
        assert!(Stage::Drafting.is_issuing());
        assert!(Stage::Rendering.is_issuing());
        assert!(!Stage::Idle.is_issuing());
        assert!(!Stage::AwaitingScriptEdit.is_issuing());
        assert!(!Stage::Ready.is_issuing());
        assert!(!Stage::Failed.is_issuing());
    }

    #[test]
    fn test_submission_stages() {
        assert!(Stage::Idle.accepts_submission());
        assert!(Stage::AwaitingScriptEdit.accepts_submission());
        assert!(!Stage::Drafting.accepts_submission());
        assert!(!Stage::Rendering.accepts_submission());
        assert!(!Stage::Ready.accepts_submission());
    }

    #[test]
    fn test_stage_serialize() {
        let json = serde_json::to_string(&Stage::AwaitingScriptEdit).unwrap();
        assert_eq!(json, r#""AwaitingScriptEdit""#);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Rendering.to_string(), "rendering");
    }

    #[test]
    fn test_error_record_display() {
        let record = ErrorRecord::new(Stage::Drafting, "실패", true);
        assert_eq!(record.to_string(), "drafting failed: 실패");
    }
}
