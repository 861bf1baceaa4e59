//! Remote pipeline client.
//!
//! This module provides the [`PipelineClient`] trait, the boundary to the
//! service that actually drafts scripts and renders videos, along with
//! concrete implementations:
//!
//! - [`MemoryPipelineClient`]: scripted in-process client for testing and
//!   offline development
//! - [`HttpPipelineClient`]: talks to the service over HTTP (feature `http`)
//!
//! Every service reply is a status-discriminated JSON envelope; see
//! [`decode_envelope`].
//!
//! # Example
//!
//! ```
//! use spool::{MemoryPipelineClient, PipelineClient};
//!
//! # async fn example() -> spool::Result<()> {
//! let client = MemoryPipelineClient::new();
//! client.push_script(Ok("S1".to_string()));
//!
//! let script = client.generate_script("비트코인").await?;
//! assert_eq!(script, "S1");
//! # Ok(())
//! # }
//! ```

mod memory;

#[cfg(feature = "http")]
mod http;

pub use memory::{MemoryPipelineClient, RecordedCall};

#[cfg(feature = "http")]
pub use http::HttpPipelineClient;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use url::Url;

use crate::{Result, SpoolError};

/// The `status` value that marks a successful reply.
pub const SUCCESS_STATUS: &str = "success";

/// URL schemes a resolved asset location may use.
const FETCHABLE_SCHEMES: [&str; 2] = ["http", "https"];

/// Directory the legacy endpoint publishes finished videos under.
pub const LEGACY_RESULTS_DIR: &str = "results";

/// The remote content-generation service.
///
/// Implementations hold no pipeline state; every call is independent.
///
/// # Object Safety
///
/// This trait is object-safe, so sessions hold an `Arc<dyn PipelineClient>`
/// and transports can be swapped at runtime.
#[async_trait]
pub trait PipelineClient: Send + Sync {
    /// Fetches the current trending topics, in feed order.
    ///
    /// # Errors
    ///
    /// Fails with [`SpoolError::Transport`] or [`SpoolError::Service`].
    async fn list_trends(&self) -> Result<Vec<String>>;

    /// Drafts a script for `topic`.
    ///
    /// # Errors
    ///
    /// Fails with [`SpoolError::Validation`] for an empty topic, before any
    /// remote call is made. Otherwise fails with a service, rejection or
    /// transport error.
    async fn generate_script(&self, topic: &str) -> Result<String>;

    /// Renders `final_script` into a video and returns its location, which
    /// may be relative to the service address.
    ///
    /// # Errors
    ///
    /// Fails with a service, rejection or transport error.
    async fn render_video(&self, topic: &str, final_script: &str) -> Result<String>;

    /// Drafts and renders in one call and returns the server-side file path.
    ///
    /// This is the legacy single-call path; the staged session never uses
    /// it. See [`resolve_legacy_file`] for turning the path into a URL.
    ///
    /// # Errors
    ///
    /// Fails with a service, rejection or transport error.
    async fn create_shorts(&self, topic: &str) -> Result<String>;
}

/// Rejects topics that are empty or only whitespace.
///
/// # Errors
///
/// Returns [`SpoolError::Validation`] for a blank topic.
pub fn validate_topic(topic: &str) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(SpoolError::Validation("topic is empty".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    msg: Option<String>,
    #[serde(flatten)]
    payload: Map<String, JsonValue>,
}

/// Payload of a successful `GET trends` reply.
#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "http"), allow(dead_code))]
pub(crate) struct TrendsReply {
    pub topics: Vec<String>,
}

/// Payload of a successful `POST generate-script` reply.
#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "http"), allow(dead_code))]
pub(crate) struct ScriptReply {
    pub script: String,
}

/// Payload of a successful `POST make-video` reply.
#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "http"), allow(dead_code))]
pub(crate) struct VideoReply {
    pub video_url: String,
}

/// Payload of a successful `POST create-shorts` reply.
#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "http"), allow(dead_code))]
pub(crate) struct ShortsReply {
    pub file: String,
}

/// Decodes a service reply.
///
/// A `status` other than `"success"` becomes [`SpoolError::Service`] with the
/// reply's `msg`, surfaced verbatim. On success the remaining fields are
/// deserialized into `T`.
///
/// # Errors
///
/// Returns [`SpoolError::MalformedResponse`] if the reply is not an envelope
/// or its payload does not match `T`.
pub fn decode_envelope<T: DeserializeOwned>(body: JsonValue) -> Result<T> {
    let envelope: Envelope = serde_json::from_value(body)
        .map_err(|e| SpoolError::MalformedResponse(format!("not a status envelope: {e}")))?;

    if envelope.status != SUCCESS_STATUS {
        return Err(SpoolError::service(
            envelope.msg.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }

    serde_json::from_value(JsonValue::Object(envelope.payload))
        .map_err(|e| SpoolError::MalformedResponse(e.to_string()))
}

/// Resolves an asset location returned by the service to an absolute URL.
///
/// Absolute `http` and `https` URLs are returned unchanged, and
/// protocol-relative ones take the scheme of `base`. Relative locations are
/// appended to `base`, keeping any path the base has. Backslashes are treated
/// as path separators.
///
/// # Errors
///
/// Returns [`SpoolError::InvalidLocation`] for an empty location, one with
/// any other scheme (including server-side paths such as `C:\app\x.mp4`),
/// or one that does not form a valid URL.
pub fn resolve_location(base: &Url, location: &str) -> Result<Url> {
    let location = location.trim().replace('\\', "/");
    if location.is_empty() {
        return Err(SpoolError::InvalidLocation("location is empty".to_string()));
    }

    let invalid = |e: url::ParseError| SpoolError::InvalidLocation(format!("{location}: {e}"));

    if location.starts_with("//") {
        return base.join(&location).map_err(invalid);
    }

    match Url::parse(&location) {
        Ok(url) if FETCHABLE_SCHEMES.contains(&url.scheme()) => Ok(url),
        Ok(url) if url.scheme().len() == 1 => Err(SpoolError::InvalidLocation(format!(
            "{location}: server-side file path"
        ))),
        Ok(url) => Err(SpoolError::InvalidLocation(format!(
            "{location}: unsupported scheme {:?}",
            url.scheme()
        ))),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let joined = format!(
                "{}/{}",
                base.as_str().trim_end_matches('/'),
                location.trim_start_matches('/')
            );
            Url::parse(&joined).map_err(invalid)
        }
        Err(e) => Err(invalid(e)),
    }
}

/// Resolves the file path returned by the legacy endpoint.
///
/// Only the file name is kept; the legacy service publishes every result
/// under `results/` on its own address.
///
/// # Errors
///
/// Returns [`SpoolError::InvalidLocation`] if the path has no file name.
pub fn resolve_legacy_file(base: &Url, file: &str) -> Result<Url> {
    let name = file
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| SpoolError::InvalidLocation(format!("no file name in {file:?}")))?;
    resolve_location(base, &format!("{LEGACY_RESULTS_DIR}/{name}"))
}
