//! The stage transition engine.
//!
//! [`step`] is a pure function from the current [`WorkflowState`] and an
//! [`Event`] to a [`Step`]: either the next state together with the remote
//! call to issue, or a verdict explaining why nothing changed.
//!
//! The engine enforces two guards:
//!
//! - **Staleness**: a response whose epoch differs from the current epoch is
//!   dropped before anything else is looked at.
//! - **Stage membership**: stage-initiating events are only legal from
//!   [`Stage::Idle`] and [`Stage::AwaitingScriptEdit`], so at most one call
//!   is outstanding and duplicate submissions are no-ops.

use chrono::Utc;

use crate::{ErrorRecord, Event, Failure, RemoteRequest, Stage, WorkflowState};

/// A remote call to issue, tagged with the epoch it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Epoch the response must match to be applied.
    pub epoch: u64,
    /// The call and its inputs.
    pub request: RemoteRequest,
}

impl Command {
    /// Returns the response event reporting that this call failed.
    pub fn failure(&self, failure: Failure) -> Event {
        let epoch = self.epoch;
        match self.request {
            RemoteRequest::GenerateScript { .. } => Event::ScriptFailed { epoch, failure },
            RemoteRequest::RenderVideo { .. } => Event::VideoFailed { epoch, failure },
        }
    }
}

/// The result of feeding one event to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The event was applied.
    Advance {
        /// The state after the event.
        next: WorkflowState,
        /// The remote call to issue, if the transition initiates one.
        command: Option<Command>,
    },

    /// The event is not legal in the current stage.
    Ignored,

    /// The event's input was invalid; the stage is unchanged.
    Rejected {
        /// Why the input was refused.
        reason: String,
    },

    /// The event is a response to a superseded request.
    Stale {
        /// Epoch the response carried.
        response_epoch: u64,
        /// Epoch of the state it arrived at.
        current_epoch: u64,
    },
}

impl Step {
    fn advance(next: WorkflowState) -> Self {
        Self::Advance {
            next,
            command: None,
        }
    }
}

/// Computes the effect of `event` on `state`.
pub fn step(state: &WorkflowState, event: Event) -> Step {
    if let Some(response_epoch) = event.response_epoch() {
        if response_epoch != state.epoch {
            return Step::Stale {
                response_epoch,
                current_epoch: state.epoch,
            };
        }
    }

    let submission = matches!(event, Event::SubmitTopic(_) | Event::SubmitVideo { .. });
    if submission && !state.stage.accepts_submission() {
        return Step::Ignored;
    }

    let mut next = state.clone();
    next.updated_at = Utc::now();

    match (state.stage, event) {
        (Stage::Idle, Event::EditTopic(topic)) => {
            next.topic = topic;
            Step::advance(next)
        }

        (Stage::Idle, Event::SubmitTopic(topic)) => {
            if topic.trim().is_empty() {
                return Step::Rejected {
                    reason: "topic is empty".to_string(),
                };
            }
            next.topic = topic.clone();
            issue(next, RemoteRequest::GenerateScript { topic })
        }

        (Stage::Drafting, Event::ScriptReady { script, .. }) => {
            next.stage = Stage::AwaitingScriptEdit;
            next.script_draft = Some(script);
            Step::advance(next)
        }

        (Stage::Drafting, Event::ScriptFailed { failure, .. }) => {
            fail(next, Stage::Drafting, failure)
        }

        (Stage::AwaitingScriptEdit, Event::EditScript(text)) => {
            next.script_draft = Some(text);
            Step::advance(next)
        }

        (Stage::AwaitingScriptEdit, Event::BackToTopic) => Step::advance(next.into_idle()),

        (
            Stage::AwaitingScriptEdit,
            Event::SubmitVideo {
                topic,
                final_script,
            },
        ) => {
            next.topic = topic.clone();
            next.script_draft = Some(final_script.clone());
            issue(
                next,
                RemoteRequest::RenderVideo {
                    topic,
                    final_script,
                },
            )
        }

        (Stage::Rendering, Event::VideoReady { location, .. }) => {
            next.stage = Stage::Ready;
            next.video_location = Some(location);
            Step::advance(next)
        }

        (Stage::Rendering, Event::VideoFailed { failure, .. }) => {
            fail(next, Stage::Rendering, failure)
        }

        (Stage::Idle, Event::Reset) => Step::Ignored,

        (stage, Event::Reset) => {
            // Bumping the epoch makes any outstanding response inert.
            if stage.is_issuing() {
                next.epoch += 1;
            }
            Step::advance(next.into_idle())
        }

        (Stage::Failed, Event::Retry) => {
            let retryable = state
                .error_detail
                .as_ref()
                .is_some_and(|record| record.retryable);
            match state.last_request.clone() {
                Some(request) if retryable => {
                    next.error_detail = None;
                    issue(next, request)
                }
                _ => Step::Ignored,
            }
        }

        _ => Step::Ignored,
    }
}

/// Moves `next` into the stage owning `request` under a fresh epoch.
fn issue(mut next: WorkflowState, request: RemoteRequest) -> Step {
    next.epoch += 1;
    next.stage = request.stage();
    next.last_request = Some(request.clone());
    Step::Advance {
        command: Some(Command {
            epoch: next.epoch,
            request,
        }),
        next,
    }
}

fn fail(mut next: WorkflowState, stage: Stage, failure: Failure) -> Step {
    next.stage = Stage::Failed;
    next.error_detail = Some(ErrorRecord::new(stage, failure.message, failure.retryable));
    Step::advance(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn applied(step: Step) -> (WorkflowState, Option<Command>) {
        match step {
            Step::Advance { next, command } => {
                assert!(next.is_consistent(), "inconsistent state: {next:?}");
                (next, command)
            }
            other => panic!("expected advance, got {other:?}"),
        }
    }

    fn drafting(topic: &str) -> WorkflowState {
        let (state, _) = applied(step(
            &WorkflowState::new(),
            Event::SubmitTopic(topic.to_string()),
        ));
        state
    }

    fn awaiting_edit(topic: &str, script: &str) -> WorkflowState {
        let state = drafting(topic);
        let (state, _) = applied(step(
            &state,
            Event::ScriptReady {
                epoch: state.epoch,
                script: script.to_string(),
            },
        ));
        state
    }

    fn rendering(topic: &str, script: &str) -> WorkflowState {
        let state = awaiting_edit(topic, script);
        let (state, _) = applied(step(
            &state,
            Event::SubmitVideo {
                topic: topic.to_string(),
                final_script: script.to_string(),
            },
        ));
        state
    }

    fn location() -> Url {
        Url::parse("http://127.0.0.1:8000/results/x.mp4").unwrap()
    }

    #[test]
    fn test_submit_topic_enters_drafting_and_issues_script_call() {
        let (state, command) = applied(step(
            &WorkflowState::new(),
            Event::SubmitTopic("비트코인".to_string()),
        ));

        assert_eq!(state.stage, Stage::Drafting);
        assert_eq!(state.topic, "비트코인");
        assert_eq!(state.epoch, 1);
        assert_eq!(
            command,
            Some(Command {
                epoch: 1,
                request: RemoteRequest::GenerateScript {
                    topic: "비트코인".to_string()
                },
            })
        );
    }

    #[test]
    fn test_submit_empty_topic_is_rejected() {
        let state = WorkflowState::new();
        for topic in ["", "   "] {
            let result = step(&state, Event::SubmitTopic(topic.to_string()));
            assert!(matches!(result, Step::Rejected { .. }));
        }
    }

    #[test]
    fn test_duplicate_submit_topic_is_ignored() {
        let state = drafting("cats");
        let result = step(&state, Event::SubmitTopic("cats".to_string()));
        assert_eq!(result, Step::Ignored);
    }

    #[test]
    fn test_edit_topic_only_while_idle() {
        let (state, command) = applied(step(
            &WorkflowState::new(),
            Event::EditTopic("dogs".to_string()),
        ));
        assert_eq!(state.topic, "dogs");
        assert!(command.is_none());

        let state = drafting("cats");
        assert_eq!(step(&state, Event::EditTopic("dogs".to_string())), Step::Ignored);
    }

    #[test]
    fn test_script_ready_stores_draft() {
        let state = awaiting_edit("cats", "S1");
        assert_eq!(state.stage, Stage::AwaitingScriptEdit);
        assert_eq!(state.script_draft.as_deref(), Some("S1"));
    }

    #[test]
    fn test_script_failure_records_drafting_error() {
        let state = drafting("cats");
        let (state, command) = applied(step(
            &state,
            Event::ScriptFailed {
                epoch: state.epoch,
                failure: Failure::new("실패", true),
            },
        ));

        assert!(command.is_none());
        assert_eq!(state.stage, Stage::Failed);
        assert_eq!(
            state.error_detail,
            Some(ErrorRecord::new(Stage::Drafting, "실패", true))
        );
    }

    #[test]
    fn test_stale_response_is_discarded() {
        let state = drafting("cats");
        let result = step(
            &state,
            Event::ScriptReady {
                epoch: state.epoch - 1,
                script: "old".to_string(),
            },
        );
        assert_eq!(
            result,
            Step::Stale {
                response_epoch: 0,
                current_epoch: 1
            }
        );
    }

    #[test]
    fn test_response_in_wrong_stage_is_ignored() {
        let state = awaiting_edit("cats", "S1");
        let result = step(
            &state,
            Event::VideoReady {
                epoch: state.epoch,
                location: location(),
            },
        );
        assert_eq!(result, Step::Ignored);
    }

    #[test]
    fn test_edit_script_replaces_draft_without_epoch_change() {
        let state = awaiting_edit("cats", "S1");
        let (next, command) = applied(step(&state, Event::EditScript("edited ✂️".to_string())));
        assert_eq!(next.script_draft.as_deref(), Some("edited ✂️"));
        assert_eq!(next.epoch, state.epoch);
        assert!(command.is_none());
    }

    #[test]
    fn test_edit_script_outside_review_is_ignored() {
        let state = drafting("cats");
        assert_eq!(step(&state, Event::EditScript("x".to_string())), Step::Ignored);
    }

    #[test]
    fn test_back_to_topic_clears_draft() {
        let state = awaiting_edit("cats", "S1");
        let (next, _) = applied(step(&state, Event::BackToTopic));
        assert_eq!(next.stage, Stage::Idle);
        assert_eq!(next.topic, "cats");
        assert!(next.script_draft.is_none());
    }

    #[test]
    fn test_submit_video_issues_render_call() {
        let state = awaiting_edit("cats", "S1");
        let (next, command) = applied(step(
            &state,
            Event::SubmitVideo {
                topic: "cats".to_string(),
                final_script: "S2".to_string(),
            },
        ));

        assert_eq!(next.stage, Stage::Rendering);
        assert_eq!(next.epoch, state.epoch + 1);
        assert_eq!(next.script_draft.as_deref(), Some("S2"));
        let command = command.unwrap();
        assert_eq!(command.epoch, next.epoch);
        assert_eq!(
            command.request,
            RemoteRequest::RenderVideo {
                topic: "cats".to_string(),
                final_script: "S2".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_submit_video_is_ignored() {
        let state = rendering("cats", "S1");
        let result = step(
            &state,
            Event::SubmitVideo {
                topic: "cats".to_string(),
                final_script: "S1".to_string(),
            },
        );
        assert_eq!(result, Step::Ignored);
    }

    #[test]
    fn test_video_ready_sets_location() {
        let state = rendering("cats", "S1");
        let (next, _) = applied(step(
            &state,
            Event::VideoReady {
                epoch: state.epoch,
                location: location(),
            },
        ));
        assert_eq!(next.stage, Stage::Ready);
        assert_eq!(next.video_location, Some(location()));
    }

    #[test]
    fn test_video_failure_keeps_draft_for_retry() {
        let state = rendering("cats", "S1");
        let (next, _) = applied(step(
            &state,
            Event::VideoFailed {
                epoch: state.epoch,
                failure: Failure::new("render crashed", true),
            },
        ));
        assert_eq!(next.stage, Stage::Failed);
        assert_eq!(next.script_draft.as_deref(), Some("S1"));
        assert_eq!(next.error_detail.unwrap().stage, Stage::Rendering);
    }

    #[test]
    fn test_reset_from_ready_clears_everything() {
        let state = rendering("cats", "S1");
        let (state, _) = applied(step(
            &state,
            Event::VideoReady {
                epoch: state.epoch,
                location: location(),
            },
        ));
        let (next, command) = applied(step(&state, Event::Reset));

        assert!(command.is_none());
        assert_eq!(next.stage, Stage::Idle);
        assert!(next.script_draft.is_none());
        assert!(next.video_location.is_none());
        assert!(next.error_detail.is_none());
        assert_eq!(next.epoch, state.epoch);
    }

    #[test]
    fn test_reset_while_drafting_invalidates_outstanding_call() {
        let state = drafting("cats");
        let (next, _) = applied(step(&state, Event::Reset));
        assert_eq!(next.stage, Stage::Idle);
        assert_eq!(next.epoch, state.epoch + 1);

        let late = step(
            &next,
            Event::ScriptReady {
                epoch: state.epoch,
                script: "late".to_string(),
            },
        );
        assert!(matches!(late, Step::Stale { .. }));
    }

    #[test]
    fn test_reset_while_idle_is_ignored() {
        assert_eq!(step(&WorkflowState::new(), Event::Reset), Step::Ignored);
    }

    #[test]
    fn test_retry_replays_script_request_under_new_epoch() {
        let state = drafting("비트코인");
        let (failed, _) = applied(step(
            &state,
            Event::ScriptFailed {
                epoch: state.epoch,
                failure: Failure::new("실패", true),
            },
        ));
        let (next, command) = applied(step(&failed, Event::Retry));

        assert_eq!(next.stage, Stage::Drafting);
        assert!(next.error_detail.is_none());
        assert_eq!(next.epoch, failed.epoch + 1);
        assert_eq!(
            command,
            Some(Command {
                epoch: next.epoch,
                request: RemoteRequest::GenerateScript {
                    topic: "비트코인".to_string()
                },
            })
        );
    }

    #[test]
    fn test_retry_replays_render_request() {
        let state = rendering("cats", "S1");
        let (failed, _) = applied(step(
            &state,
            Event::VideoFailed {
                epoch: state.epoch,
                failure: Failure::new("timeout", true),
            },
        ));
        let (next, command) = applied(step(&failed, Event::Retry));

        assert_eq!(next.stage, Stage::Rendering);
        assert_eq!(
            command.unwrap().request,
            RemoteRequest::RenderVideo {
                topic: "cats".to_string(),
                final_script: "S1".to_string()
            }
        );
    }

    #[test]
    fn test_retry_of_rejected_inputs_is_ignored() {
        let state = drafting("cats");
        let (failed, _) = applied(step(
            &state,
            Event::ScriptFailed {
                epoch: state.epoch,
                failure: Failure::new("topic not allowed", false),
            },
        ));
        assert_eq!(step(&failed, Event::Retry), Step::Ignored);
    }

    #[test]
    fn test_retry_outside_failed_is_ignored() {
        let state = awaiting_edit("cats", "S1");
        assert_eq!(step(&state, Event::Retry), Step::Ignored);
    }

    #[test]
    fn test_command_failure_matches_request() {
        let state = rendering("cats", "S1");
        let command = Command {
            epoch: state.epoch,
            request: state.last_request.clone().unwrap(),
        };

        let event = command.failure(Failure::new("offline", true));
        assert_eq!(event.response_epoch(), Some(state.epoch));

        let (next, _) = applied(step(&state, event));
        assert_eq!(next.stage, Stage::Failed);
        assert_eq!(next.error_detail.unwrap().stage, Stage::Rendering);
    }

    #[test]
    fn test_epoch_never_decreases() {
        let events = vec![
            Event::SubmitTopic("a".to_string()),
            Event::Reset,
            Event::SubmitTopic("b".to_string()),
            Event::ScriptReady {
                epoch: 3,
                script: "S".to_string(),
            },
            Event::SubmitVideo {
                topic: "b".to_string(),
                final_script: "S".to_string(),
            },
            Event::VideoFailed {
                epoch: 4,
                failure: Failure::new("x", true),
            },
            Event::Retry,
            Event::Reset,
        ];

        let mut state = WorkflowState::new();
        for event in events {
            if let Step::Advance { next, .. } = step(&state, event) {
                assert!(next.epoch >= state.epoch);
                assert!(next.is_consistent());
                state = next;
            }
        }
        assert_eq!(state.stage, Stage::Idle);
        assert_eq!(state.epoch, 6);
    }
}
