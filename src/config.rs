use std::time::Duration;

use crate::{Error, Result};

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const CHANNEL_ENV: &str = "PG_CHANNEL";
pub const DEFAULT_CHANNEL: &str = "events";

/// Listener and connection configuration.
///
/// Only the connection target is mandatory; everything else has defaults
/// that can be adjusted with the `with_*` builders.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use gossippg::Config;
///
/// let config = Config::new("postgres://localhost/app")
///     .with_channel("orders")
///     .with_ping_interval(Duration::from_secs(10));
/// assert_eq!(config.channel, "orders");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Connection target passed to the subscription client, e.g. a
    /// `postgres://` URL or a key/value connection string.
    pub database_url: String,

    /// Channel to `LISTEN` on.
    /// Default: `"events"`
    pub channel: String,

    /// How often the listener probes the connection while idle.
    /// A quiet link may be dead without the server ever saying so;
    /// the probe forces the client to notice.
    /// Default: 30 s
    pub ping_interval: Duration,

    /// Delay before the second reconnection attempt. The first attempt
    /// after a disconnect is immediate, later ones double the delay.
    /// Default: 10 s
    pub min_reconnect_interval: Duration,

    /// Upper bound for the reconnection delay.
    /// Default: 60 s
    pub max_reconnect_interval: Duration,

    /// Timeout for establishing a connection, unless the connection
    /// target sets its own `connect_timeout`.
    /// Default: 10 s
    pub connect_timeout: Duration,

    /// How long a liveness probe may take before it's reported as failed.
    /// Default: 10 s
    pub probe_timeout: Duration,

    /// Capacity of the queue between the connection and the listener loop.
    /// Notifications beyond it are held by the connection driver.
    /// Default: 128
    pub notification_buffer: usize,
}

impl Config {
    pub fn new<U: Into<String>>(database_url: U) -> Self {
        Config {
            database_url: database_url.into(),
            channel: DEFAULT_CHANNEL.to_string(),
            ping_interval: Duration::from_secs(30),
            min_reconnect_interval: Duration::from_secs(10),
            max_reconnect_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(10),
            notification_buffer: 128,
        }
    }

    /// Load the configuration from `DATABASE_URL` and `PG_CHANNEL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`.
    ///
    /// A missing or empty `DATABASE_URL` is an error, a missing or empty
    /// `PG_CHANNEL` falls back to `"events"`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(DATABASE_URL_ENV)
            .filter(|url| !url.is_empty())
            .ok_or(Error::MissingEnv(DATABASE_URL_ENV))?;

        let config = Config::new(database_url);
        Ok(match lookup(CHANNEL_ENV).filter(|ch| !ch.is_empty()) {
            Some(channel) => config.with_channel(channel),
            None => config,
        })
    }

    pub fn with_channel<C: Into<String>>(mut self, channel: C) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the reconnection backoff bounds.
    pub fn with_reconnect_interval(mut self, min: Duration, max: Duration) -> Self {
        self.min_reconnect_interval = min;
        self.max_reconnect_interval = max.max(min);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_notification_buffer(mut self, size: usize) -> Self {
        self.notification_buffer = size.max(1);
        self
    }

    /// Check the invariants the listener relies on.
    pub fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            return Err(Error::MissingEnv(DATABASE_URL_ENV));
        }
        if self.channel.is_empty() {
            return Err(Error::EmptyChannel);
        }
        Ok(())
    }
}
