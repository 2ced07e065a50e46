//! # sockpool-core
//!
//! Core types for the sockpool socket multiplexer.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Descriptors, syscalls and the background poller live in
//! `sockpool-runtime`.
//!
//! ## Modules
//!
//! - `buffer` - Per-connection inbound chunk queue (stream/datagram framing)
//! - `state` - Connection lifecycle state and framing mode enums
//! - `error` - Error types
//! - `cancel` - Cancellation token for the background task
//! - `collab` - Contracts for host-side collaborators (persistence keys)
//! - `log` - Leveled stderr logging macros
//! - `env` - Environment variable utilities

pub mod buffer;
pub mod state;
pub mod error;
pub mod cancel;
pub mod collab;
pub mod log;
pub mod env;

// Re-exports for convenience
pub use buffer::Buffer;
pub use state::{Framing, SocketState};
pub use error::{SockError, SockResult};
pub use cancel::CancellationToken;
pub use collab::{ObjectKey, ObjectKeys};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str};

/// Shared constants
pub mod constants {
    /// Error code meaning "no error". A failed operation that leaves this in
    /// `last_error` is the retry signal.
    pub const NO_ERROR: i32 = 0;

    /// Message delimiter for stream framing.
    pub const FRAME_DELIMITER: u8 = 0;
}
