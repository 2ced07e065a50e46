//! Library defaults for `PoolConfig`

/// Upper bound on one readiness wait of the poller
pub const POLL_TIMEOUT_MS: u64 = 500;

/// How long pool shutdown waits for the poller before abandoning it
pub const SHUTDOWN_GRACE_MS: u64 = 2000;

/// Bounded wait for peer activity during a graceful close
pub const CLOSE_LINGER_US: u64 = 500;

/// Scratch size of one poller read
pub const RECV_CHUNK: usize = 64 * 1024;

/// Backlog used by `Socket::listen_default`
pub const LISTEN_BACKLOG: i32 = 10;

pub const THREAD_NAME: &str = "sockpool-poller";
