//! HTTP pipeline client.
//!
//! This module provides [`HttpPipelineClient`], a [`PipelineClient`] that
//! talks to the remote service with `reqwest`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{
    decode_envelope, validate_topic, PipelineClient, ScriptReply, ShortsReply, TrendsReply,
    VideoReply,
};
use crate::{Config, Result, SpoolError};

/// A [`PipelineClient`] backed by HTTP.
///
/// Endpoints are resolved against the configured base URL:
///
/// | Operation | Request |
/// |---|---|
/// | `list_trends` | `GET trends` |
/// | `generate_script` | `POST generate-script {topic}` |
/// | `render_video` | `POST make-video {topic, final_script}` |
/// | `create_shorts` | `POST create-shorts?topic=` |
///
/// # Example
///
/// ```no_run
/// use spool::{Config, HttpPipelineClient, PipelineClient};
///
/// # async fn example() -> spool::Result<()> {
/// let client = HttpPipelineClient::new(&Config::from_env()?)?;
/// let topics = client.list_trends().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpPipelineClient {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
    render_timeout: Duration,
}

impl HttpPipelineClient {
    /// Creates a client for the service described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| SpoolError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a client reusing an existing `reqwest::Client`.
    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            request_timeout: config.request_timeout,
            render_timeout: config.render_timeout,
        }
    }

    /// Returns the base URL endpoints are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the absolute URL of an endpoint.
    fn endpoint(&self, path: &str) -> Result<Url> {
        endpoint_url(&self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<T> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        debug!(%status, bytes = body.len(), "service replied");

        match serde_json::from_slice::<JsonValue>(&body) {
            Ok(json) if is_envelope(&json) => decode_envelope(json),
            _ => Err(status_error(status, &String::from_utf8_lossy(&body))),
        }
    }
}

#[async_trait]
impl PipelineClient for HttpPipelineClient {
    async fn list_trends(&self) -> Result<Vec<String>> {
        let request = self.client.get(self.endpoint("trends")?);
        let reply: TrendsReply = self.send(request, self.request_timeout).await?;
        Ok(reply.topics)
    }

    async fn generate_script(&self, topic: &str) -> Result<String> {
        validate_topic(topic)?;
        let request = self
            .client
            .post(self.endpoint("generate-script")?)
            .json(&json!({ "topic": topic }));
        let reply: ScriptReply = self.send(request, self.request_timeout).await?;
        Ok(reply.script)
    }

    async fn render_video(&self, topic: &str, final_script: &str) -> Result<String> {
        let request = self
            .client
            .post(self.endpoint("make-video")?)
            .json(&json!({ "topic": topic, "final_script": final_script }));
        let reply: VideoReply = self.send(request, self.render_timeout).await?;
        Ok(reply.video_url)
    }

    async fn create_shorts(&self, topic: &str) -> Result<String> {
        validate_topic(topic)?;
        let request = self
            .client
            .post(self.endpoint("create-shorts")?)
            .query(&[("topic", topic)]);
        let reply: ShortsReply = self.send(request, self.render_timeout).await?;
        Ok(reply.file)
    }
}

fn endpoint_url(base: &Url, path: &str) -> Result<Url> {
    let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| SpoolError::Config(format!("invalid endpoint {path}: {e}")))
}

fn is_envelope(json: &JsonValue) -> bool {
    json.get("status").is_some_and(JsonValue::is_string)
}

fn transport_error(error: reqwest::Error) -> SpoolError {
    warn!(error = %error, "request did not complete");
    if error.is_timeout() {
        SpoolError::Transport(format!("request timed out: {error}"))
    } else {
        SpoolError::Transport(error.to_string())
    }
}

/// Maps a reply that is not a status envelope onto the error taxonomy.
fn status_error(status: StatusCode, body: &str) -> SpoolError {
    let detail = body.trim();
    let message = if detail.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {detail}")
    };

    if status.is_client_error() {
        SpoolError::rejected(message)
    } else if status.is_server_error() {
        SpoolError::service(message)
    } else {
        SpoolError::MalformedResponse(message)
    }
}
