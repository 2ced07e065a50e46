//! Pool configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use sockpool_runtime::config::PoolConfig;
//!
//! // Defaults with env overrides
//! let config = PoolConfig::from_env();
//!
//! // Or customize programmatically
//! let config = PoolConfig::new()
//!     .poll_timeout(Duration::from_millis(50))
//!     .close_linger(Duration::from_millis(2));
//! ```

pub mod defaults;

use std::time::Duration;

use sockpool_core::env::{env_get, env_get_micros, env_get_millis, env_get_str};
use sockpool_core::error::SockError;
use sockpool_core::log_println;

/// Pool configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on one poller readiness wait
    pub poll_timeout: Duration,
    /// Poller join grace at shutdown
    pub shutdown_grace: Duration,
    /// Graceful-close wait for peer activity
    pub close_linger: Duration,
    /// Bytes read per poller `recv`
    pub recv_chunk: usize,
    /// Backlog for `listen_default`
    pub listen_backlog: i32,
    /// Name of the poller thread
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PoolConfig {
    /// Library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `SOCKPOOL_POLL_TIMEOUT_MS` - Poll wait bound in milliseconds
    /// - `SOCKPOOL_SHUTDOWN_GRACE_MS` - Poller join grace in milliseconds
    /// - `SOCKPOOL_CLOSE_LINGER_US` - Graceful-close wait in microseconds
    /// - `SOCKPOOL_RECV_CHUNK` - Poller read size in bytes
    /// - `SOCKPOOL_LISTEN_BACKLOG` - Default listen backlog
    /// - `SOCKPOOL_THREAD_NAME` - Poller thread name
    pub fn from_env() -> Self {
        Self {
            poll_timeout: env_get_millis("SOCKPOOL_POLL_TIMEOUT_MS", defaults::POLL_TIMEOUT_MS),
            shutdown_grace: env_get_millis("SOCKPOOL_SHUTDOWN_GRACE_MS", defaults::SHUTDOWN_GRACE_MS),
            close_linger: env_get_micros("SOCKPOOL_CLOSE_LINGER_US", defaults::CLOSE_LINGER_US),
            recv_chunk: env_get("SOCKPOOL_RECV_CHUNK", defaults::RECV_CHUNK),
            listen_backlog: env_get("SOCKPOOL_LISTEN_BACKLOG", defaults::LISTEN_BACKLOG),
            thread_name: env_get_str("SOCKPOOL_THREAD_NAME", defaults::THREAD_NAME),
        }
    }

    /// Library defaults only, no environment lookup.
    pub fn new() -> Self {
        Self {
            poll_timeout: Duration::from_millis(defaults::POLL_TIMEOUT_MS),
            shutdown_grace: Duration::from_millis(defaults::SHUTDOWN_GRACE_MS),
            close_linger: Duration::from_micros(defaults::CLOSE_LINGER_US),
            recv_chunk: defaults::RECV_CHUNK,
            listen_backlog: defaults::LISTEN_BACKLOG,
            thread_name: defaults::THREAD_NAME.to_string(),
        }
    }

    // Builder methods

    pub fn poll_timeout(mut self, d: Duration) -> Self {
        self.poll_timeout = d;
        self
    }

    pub fn shutdown_grace(mut self, d: Duration) -> Self {
        self.shutdown_grace = d;
        self
    }

    pub fn close_linger(mut self, d: Duration) -> Self {
        self.close_linger = d;
        self
    }

    pub fn recv_chunk(mut self, bytes: usize) -> Self {
        self.recv_chunk = bytes;
        self
    }

    pub fn listen_backlog(mut self, backlog: i32) -> Self {
        self.listen_backlog = backlog;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("poll_timeout must be > 0"));
        }
        if self.recv_chunk == 0 {
            return Err(ConfigError::InvalidValue("recv_chunk must be > 0"));
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::InvalidValue("thread_name must not be empty"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        log_println!("Socket pool configuration:");
        log_println!("  poll_timeout:    {:?}", self.poll_timeout);
        log_println!("  shutdown_grace:  {:?}", self.shutdown_grace);
        log_println!("  close_linger:    {:?}", self.close_linger);
        log_println!("  recv_chunk:      {}", self.recv_chunk);
        log_println!("  listen_backlog:  {}", self.listen_backlog);
        log_println!("  thread_name:     {}", self.thread_name);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for SockError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => SockError::InvalidConfig(msg),
        }
    }
}
