//! Pipeline status reporting and visualization.
//!
//! This module provides [`PipelineStatus`], a step-by-step summary of a
//! [`WorkflowState`] meant for display.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::{Stage, WorkflowState};

/// Progress of one step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Not reached yet.
    Pending,
    /// A remote call for this step is outstanding.
    InProgress,
    /// Done.
    Complete,
    /// The step's remote call failed.
    Failed,
    /// Waiting for the user to review.
    Paused,
}

impl StepStatus {
    /// Returns a status indicator character.
    pub fn status_char(&self) -> char {
        match self {
            Self::Pending => '⏳',
            Self::InProgress => '🔄',
            Self::Complete => '✅',
            Self::Failed => '❌',
            Self::Paused => '👀',
        }
    }
}

/// Status entry for a single step.
#[derive(Debug, Clone)]
pub struct StepEntry {
    /// The step name.
    pub name: &'static str,
    /// Current progress.
    pub status: StepStatus,
    /// Short detail shown next to the step.
    pub detail: Option<String>,
}

impl StepEntry {
    fn new(name: &'static str, status: StepStatus, detail: Option<String>) -> Self {
        Self {
            name,
            status,
            detail,
        }
    }
}

/// A snapshot of where the pipeline stands.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    /// The current stage.
    pub stage: Stage,
    /// The current epoch.
    pub epoch: u64,
    /// Topic, script and video steps, in order.
    pub steps: Vec<StepEntry>,
    /// Failure message when the pipeline failed.
    pub error: Option<String>,
    /// Whether a failed pipeline can be retried as is.
    pub retryable: bool,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}

impl PipelineStatus {
    /// Builds a status summary from a workflow state.
    pub fn from_state(state: &WorkflowState) -> Self {
        use StepStatus::*;

        let failed_at = state.error_detail.as_ref().map(|record| record.stage);
        let (topic, script, video) = match (state.stage, failed_at) {
            (Stage::Idle, _) => (Pending, Pending, Pending),
            (Stage::Drafting, _) => (Complete, InProgress, Pending),
            (Stage::AwaitingScriptEdit, _) => (Complete, Paused, Pending),
            (Stage::Rendering, _) => (Complete, Complete, InProgress),
            (Stage::Ready, _) => (Complete, Complete, Complete),
            (Stage::Failed, Some(Stage::Rendering)) => (Complete, Complete, Failed),
            (Stage::Failed, _) => (Complete, Failed, Pending),
        };

        let topic_detail = (!state.topic.is_empty()).then(|| state.topic.clone());
        let script_detail = state
            .script_draft
            .as_ref()
            .map(|draft| format!("{} chars", draft.chars().count()));
        let video_detail = state.video_location.as_ref().map(|url| url.to_string());

        Self {
            stage: state.stage,
            epoch: state.epoch,
            steps: vec![
                StepEntry::new("topic", topic, topic_detail),
                StepEntry::new("script", script, script_detail),
                StepEntry::new("video", video, video_detail),
            ],
            error: state.error_detail.as_ref().map(|r| r.message.clone()),
            retryable: state.error_detail.as_ref().is_some_and(|r| r.retryable),
            updated_at: state.updated_at,
        }
    }

    /// Returns true if the video is ready.
    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Complete))
    }

    /// Returns true if a step has failed.
    pub fn has_failures(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Failed))
    }

    /// Returns true if the draft is waiting for review.
    pub fn awaiting_review(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Paused))
    }

    /// Returns the overall progress as a percentage.
    pub fn progress_percent(&self) -> f32 {
        let completed = self
            .steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Complete))
            .count();

        (completed as f32 / self.steps.len() as f32) * 100.0
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Pipeline status (epoch {}, updated {}):",
            self.epoch,
            self.updated_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(f)?;

        for step in &self.steps {
            write!(
                f,
                "  {} {:<8} {:<12}",
                step.status.status_char(),
                step.name,
                format!("{:?}", step.status)
            )?;
            if let Some(ref detail) = step.detail {
                write!(f, " {}", detail)?;
            }
            writeln!(f)?;
        }

        writeln!(f)?;
        writeln!(f, "Progress: {:.0}%", self.progress_percent())?;

        if self.is_complete() {
            writeln!(f, "Status: Complete")?;
        } else if let Some(ref error) = self.error {
            let hint = if self.retryable { "retry or reset" } else { "reset" };
            writeln!(f, "Status: Failed: {} ({})", error, hint)?;
        } else if self.awaiting_review() {
            writeln!(f, "Status: Awaiting script review")?;
        } else if self.stage == Stage::Idle {
            writeln!(f, "Status: Waiting for a topic")?;
        } else {
            writeln!(f, "Status: In progress")?;
        }

        Ok(())
    }
}
