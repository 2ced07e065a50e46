//! # sockpool-runtime
//!
//! Platform runtime for the sockpool socket multiplexer.
//!
//! This crate provides:
//! - Raw socket syscall wrappers (libc, errno via nix)
//! - Wake signal (eventfd on Linux, self-pipe elsewhere)
//! - Background task with bounded-grace teardown
//! - The `Pool` and its background poller
//! - Pool-managed `Socket` handles
//! - Persistence snapshots for sockets

pub mod addr;
pub mod config;
pub mod persist;
pub mod pool;
pub mod socket;
pub mod sys;
pub mod task;
pub mod wake;

// Re-exports
pub use addr::{AddrRef, AddrRegistry, RawAddr, SockAddr};
pub use config::PoolConfig;
pub use persist::SocketSnapshot;
pub use pool::{Pool, PoolStats};
pub use socket::Socket;
pub use task::{BackgroundTask, TaskContext};
pub use wake::{new_wake_signal, WakeSignal};

cfg_if::cfg_if! {
    if #[cfg(not(unix))] {
        compile_error!("sockpool-runtime supports Unix targets only");
    }
}
