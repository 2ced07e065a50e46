//! Error types for sockpool
//!
//! Network failures on individual sockets are not errors in this sense: they
//! are reported through a socket's `last_error` code. `SockError` covers the
//! structural failures around the pool itself.

use core::fmt;

use crate::collab::ObjectKey;

/// Result type for pool-level operations
pub type SockResult<T> = Result<T, SockError>;

/// Errors that can occur setting up or tearing down the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockError {
    /// Wake signal descriptor could not be created
    WakeSetup(i32),

    /// Wake signal could not be raised
    WakeSignal(i32),

    /// Background poller thread could not be spawned
    SpawnFailed,

    /// Background task was already started
    AlreadyStarted,

    /// Pool configuration rejected
    InvalidConfig(&'static str),

    /// A restored socket references an address that was not restored first
    AddressNotRestored(ObjectKey),

    /// Persisted socket record is shorter than its fixed header
    Truncated { expected: usize, got: usize },

    /// Raw platform error
    Os(i32),
}

impl fmt::Display for SockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SockError::WakeSetup(e) => write!(f, "wake signal setup failed: errno {}", e),
            SockError::WakeSignal(e) => write!(f, "wake signal failed: errno {}", e),
            SockError::SpawnFailed => write!(f, "failed to spawn poller thread"),
            SockError::AlreadyStarted => write!(f, "background task already started"),
            SockError::InvalidConfig(msg) => write!(f, "invalid pool config: {}", msg),
            SockError::AddressNotRestored(key) => {
                write!(f, "address {} must be restored before the socket referencing it", key)
            }
            SockError::Truncated { expected, got } => {
                write!(f, "truncated socket record: need {} bytes, got {}", expected, got)
            }
            SockError::Os(e) => write!(f, "OS error: errno {}", e),
        }
    }
}

impl std::error::Error for SockError {}

impl From<std::io::Error> for SockError {
    fn from(e: std::io::Error) -> Self {
        SockError::Os(e.raw_os_error().unwrap_or(0))
    }
}
