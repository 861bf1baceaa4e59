//! The workflow state store.
//!
//! [`WorkflowStore`] owns the single [`WorkflowState`] of a session. The
//! only way to change it is [`WorkflowStore::apply`], which runs the engine
//! inside one critical section so that each event sees the result of the one
//! before it and the stage and epoch always change together.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::engine::{self, Command, Step};
use crate::{Event, Notification, Stage, WorkflowState};

/// What [`WorkflowStore::apply`] did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The state changed; the command, if any, must be issued.
    Transitioned {
        /// Stage before the event.
        from: Stage,
        /// Stage after the event.
        to: Stage,
        /// The remote call to issue.
        command: Option<Command>,
    },
    /// The event was not legal in the current stage.
    Ignored,
    /// The event's input was invalid.
    Rejected(String),
    /// The event was a response to a superseded request.
    Discarded,
}

/// Observable holder of the session's [`WorkflowState`].
///
/// Cloning is cheap; clones share the same state and channels.
#[derive(Debug, Clone)]
pub struct WorkflowStore {
    state: Arc<watch::Sender<WorkflowState>>,
    events: broadcast::Sender<Notification>,
}

impl WorkflowStore {
    /// Creates a store holding a fresh idle state.
    pub fn new(event_capacity: usize) -> Self {
        let (state, _) = watch::channel(WorkflowState::new());
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: Arc::new(state),
            events,
        }
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> WorkflowState {
        self.state.borrow().clone()
    }

    /// Returns the current stage.
    pub fn stage(&self) -> Stage {
        self.state.borrow().stage
    }

    /// Returns the current epoch.
    pub fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    /// Subscribes to state changes.
    ///
    /// The receiver always holds the latest applied state.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.state.subscribe()
    }

    /// Subscribes to dispatch notifications.
    ///
    /// Notifications are not persisted; a receiver that falls behind the
    /// channel capacity loses the oldest ones.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    /// Emits a notification to all subscribers.
    ///
    /// Ignores send errors (no subscribers).
    pub(crate) fn emit(&self, notification: Notification) {
        let _ = self.events.send(notification);
    }

    /// Feeds one event through the engine and stores the result.
    pub fn apply(&self, event: Event) -> Applied {
        let name = event.name();
        let mut applied = Applied::Ignored;
        let mut notes = Vec::with_capacity(2);

        self.state.send_if_modified(|state| match engine::step(state, event) {
            Step::Advance { next, command } => {
                let from = state.stage;
                let to = next.stage;
                notes.push(Notification::Transitioned {
                    from,
                    to,
                    epoch: next.epoch,
                });
                if let Some(command) = &command {
                    notes.push(Notification::CallIssued {
                        epoch: command.epoch,
                        call: command.request.name(),
                    });
                }
                *state = next;
                applied = Applied::Transitioned { from, to, command };
                true
            }
            Step::Ignored => {
                notes.push(Notification::EventIgnored {
                    stage: state.stage,
                    event: name,
                });
                false
            }
            Step::Rejected { reason } => {
                notes.push(Notification::EventRejected {
                    stage: state.stage,
                    reason: reason.clone(),
                });
                applied = Applied::Rejected(reason);
                false
            }
            Step::Stale {
                response_epoch,
                current_epoch,
            } => {
                notes.push(Notification::ResponseDiscarded {
                    response_epoch,
                    current_epoch,
                });
                applied = Applied::Discarded;
                false
            }
        });

        match &applied {
            Applied::Transitioned { from, to, .. } => {
                info!(event = name, %from, %to, "transition applied");
            }
            Applied::Ignored => debug!(event = name, "event ignored in current stage"),
            Applied::Rejected(reason) => debug!(event = name, %reason, "event rejected"),
            Applied::Discarded => debug!(event = name, "stale response discarded"),
        }

        for note in notes {
            self.emit(note);
        }
        applied
    }
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CAPACITY)
    }
}
