//! # Spool
//!
//! Staged, human-in-the-loop orchestration for short-form video generation.
//!
//! Spool turns a topic into a finished short video by driving a remote
//! content-generation service through three steps: draft a script, let a
//! person review and edit it, then render the video. The service itself is
//! opaque, reached through the [`PipelineClient`] trait. What Spool owns is
//! the client-side workflow around it:
//!
//! - One [`WorkflowState`] per [`Session`], changed only by [`Event`]s that
//!   the transition engine ([`engine::step`]) accepts for the current
//!   [`Stage`]
//! - At most one outstanding remote call per stage; a second submission
//!   while drafting or rendering is a no-op
//! - Every call is tagged with an epoch, and responses from superseded
//!   requests are dropped on arrival
//! - Reset, retry and "back to topic" branch backward without corrupting
//!   in-flight work
//! - Trend suggestions live in their own [`TrendCache`] and can only seed
//!   the topic while the pipeline is idle
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use spool::{Config, Session, Stage};
//!
//! let session = Session::connect(Config::from_env()?)?;
//!
//! session.fetch_trends().await?;
//! session.select_trend(0);
//!
//! // Draft, review, render
//! session.submit_topic(session.state().topic).settle().await;
//! session.edit_script("A tighter script.");
//! session.submit_draft().settle().await;
//!
//! if session.state().stage == Stage::Ready {
//!     println!("{}", session.status());
//! }
//! ```
//!
//! ## Design Philosophy
//!
//! A spool holds the thread a loom draws on, and it holds the film a
//! projector runs. Both only move forward one turn at a time, and both can
//! be rewound. Stale work is never patched back in: a new epoch winds past
//! it instead.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod session;
pub mod stage;
pub mod state;
pub mod status;
pub mod store;
pub mod trends;

#[cfg(feature = "http")]
pub use client::HttpPipelineClient;
pub use client::{MemoryPipelineClient, PipelineClient, RecordedCall};
pub use config::Config;
pub use engine::{Command, Step};
pub use error::{Result, SpoolError};
pub use event::{Event, Failure, Notification};
pub use session::{Dispatched, Session};
pub use stage::{ErrorRecord, Stage};
pub use state::{RemoteRequest, WorkflowState};
pub use status::{PipelineStatus, StepStatus};
pub use store::{Applied, WorkflowStore};
pub use trends::{TrendCache, TrendStatus, TrendSuggestions};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
