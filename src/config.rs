//! Session configuration.
//!
//! [`Config`] carries the base address of the remote pipeline service and
//! the timeouts used when talking to it. Values can be set in code or read
//! from the environment (a `.env` file is honoured when present).

use std::env;
use std::time::Duration;
use url::Url;

use crate::{Result, SpoolError};

/// Default service address.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Default timeout for short calls (trends, script drafting).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for video rendering, which takes tens of seconds.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(300);

/// Default capacity of the notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

const ENV_BASE_URL: &str = "SPOOL_API_URL";
const ENV_REQUEST_TIMEOUT: &str = "SPOOL_REQUEST_TIMEOUT_SECS";
const ENV_RENDER_TIMEOUT: &str = "SPOOL_RENDER_TIMEOUT_SECS";
const ENV_EVENT_CAPACITY: &str = "SPOOL_EVENT_CAPACITY";

/// Configuration for a [`Session`](crate::Session) and its HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base address that endpoints and relative asset locations resolve
    /// against.
    pub base_url: Url,
    /// Timeout for trend and script calls.
    pub request_timeout: Duration,
    /// Timeout for render and legacy single-call requests.
    pub render_timeout: Duration,
    /// Capacity of the notification broadcast channel.
    pub event_capacity: usize,
}

impl Config {
    /// Creates a configuration for the given service address.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Parses `base_url` and creates a configuration for it.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Config`] if the address is not a valid base URL.
    pub fn parse(base_url: &str) -> Result<Self> {
        Ok(Self::new(parse_base_url(base_url)?))
    }

    /// Reads the configuration from the environment.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Unset variables fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Config`] if a variable is set to an invalid
    /// value.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut config = Self::parse(&base_url)?;

        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT) {
            let secs = parse_number(ENV_REQUEST_TIMEOUT, &value)?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(value) = lookup(ENV_RENDER_TIMEOUT) {
            let secs = parse_number(ENV_RENDER_TIMEOUT, &value)?;
            config.render_timeout = Duration::from_secs(secs);
        }
        if let Some(value) = lookup(ENV_EVENT_CAPACITY) {
            let capacity = parse_number(ENV_EVENT_CAPACITY, &value)?;
            config.event_capacity = usize::try_from(capacity)
                .map_err(|_| SpoolError::Config(format!("{ENV_EVENT_CAPACITY} is too large")))?;
        }

        if config.event_capacity == 0 {
            return Err(SpoolError::Config(format!(
                "{ENV_EVENT_CAPACITY} must be greater than zero"
            )));
        }
        Ok(config)
    }

    /// Sets the timeout for trend and script calls.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the timeout for render calls.
    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    /// Sets the notification channel capacity. Zero is raised to one.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

fn parse_base_url(value: &str) -> Result<Url> {
    let url = Url::parse(value.trim())
        .map_err(|e| SpoolError::Config(format!("invalid base URL {value:?}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(SpoolError::Config(format!(
            "{value:?} cannot be used as a base URL"
        )));
    }
    Ok(url)
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| SpoolError::Config(format!("{key} must be a whole number, got {value:?}")))
}
