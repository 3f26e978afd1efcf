use std::time::Duration;

use rand::RngExt;
use url::Url;

use crate::error::{BellError, Result};

pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_STREAM_PATH: &str = "/api/ws/notifications";
pub const DEFAULT_HEARTBEAT_PAYLOAD: &str = "ping";

/// Reconnection behaviour for the push channel.
///
/// The delay doubles per consecutive failed attempt up to `max_delay`.
/// `max_delay == base_delay` with `jitter = false` gives a plain fixed-delay loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt.
    pub base_delay: Duration,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
    /// When true, adds random jitter of [0, base_delay/2) without exceeding `max_delay`.
    pub jitter: bool,
    /// Give up after this many consecutive failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            jitter: true,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Retry forever with the same delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            jitter: false,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether another attempt is allowed after `attempt` consecutive failures.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }

    /// Delay before reconnection attempt `attempt`, counted from zero.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if !self.jitter {
            return delay;
        }

        let spread = (self.base_delay / 2).min(self.max_delay.saturating_sub(delay));
        match u64::try_from(spread.as_millis()) {
            Ok(0) => delay,
            Ok(spread_ms) => delay + Duration::from_millis(rand::rng().random_range(0..spread_ms)),
            Err(_) => delay,
        }
    }

    /// `base_delay * 2^attempt`, clamped to `max_delay`.
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// Endpoints and timings for a notification client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin, e.g. `https://dashboard.example.com`
    pub base_url: String,
    /// Prefix for the REST routes
    pub api_prefix: String,
    /// Path of the push endpoint
    pub stream_path: String,
    /// Overall timeout for a single REST request
    pub request_timeout: Duration,
    /// Keep-alive ping interval while the channel is open
    pub heartbeat_interval: Duration,
    /// Text frame sent as the keep-alive ping
    pub heartbeat_payload: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            request_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_payload: DEFAULT_HEARTBEAT_PAYLOAD.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn with_stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Check that the configured endpoints can be turned into URLs.
    pub fn validate(&self) -> Result<()> {
        let base = self.base()?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(BellError::config(format!(
                "base URL must be http or https, got {}",
                base.scheme()
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(BellError::config("heartbeat interval must be non-zero"));
        }
        if self.reconnect.base_delay.is_zero() {
            return Err(BellError::config("reconnect base delay must be non-zero"));
        }
        Ok(())
    }

    /// Absolute URL of a REST route below the API prefix.
    pub fn rest_url(&self, path: &str) -> Result<Url> {
        let mut url = self.base()?;
        let joined = join_paths(url.path(), &[&self.api_prefix, path]);
        url.set_path(&joined);
        Ok(url)
    }

    /// Push endpoint URL carrying `token` as a query parameter.
    ///
    /// The WebSocket upgrade request cannot carry an `Authorization` header
    /// in browsers, so the backend reads the credential from the query.
    pub fn stream_url(&self, token: &str) -> Result<Url> {
        let mut url = self.base()?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| BellError::config(format!("cannot derive {scheme} URL")))?;
        let joined = join_paths(url.path(), &[&self.stream_path]);
        url.set_path(&joined);
        url.query_pairs_mut().clear().append_pair("token", token);
        Ok(url)
    }

    fn base(&self) -> Result<Url> {
        Ok(Url::parse(self.base_url.trim())?)
    }
}

fn join_paths(base: &str, parts: &[&str]) -> String {
    let mut out = base.trim_end_matches('/').to_string();
    for part in parts {
        let part = part.trim_matches('/');
        if part.is_empty() {
            continue;
        }
        out.push('/');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}
