//! Wake signal for the background poller
//!
//! The poller blocks in `poll(2)`; a wake signal is a descriptor it can
//! include in that wait so other threads can interrupt it. Foreground code
//! raises it on every pool membership change and on shutdown.
//!
//! # Implementors
//!
//! - `EventFdWake` (Linux): one eventfd, counter semantics.
//! - `PipeWake` (other Unix, or `force-pipe-wake`): classic self-pipe.

use std::os::unix::io::RawFd;

use sockpool_core::error::SockResult;

/// Cross-thread interrupt for a blocking readiness wait.
///
/// **Contract:**
/// - `signal()` never blocks. Several signals before a `reset()` coalesce
///   into one wakeup.
/// - `fd()` becomes readable after `signal()` and stays readable until
///   `reset()`.
/// - `reset()` never blocks, even if nothing was signalled.
pub trait WakeSignal: Send + Sync {
    /// Descriptor to include in the readiness wait (`POLLIN`).
    fn fd(&self) -> RawFd;

    /// Make `fd()` readable.
    fn signal(&self) -> SockResult<()>;

    /// Drain pending signals.
    fn reset(&self);
}

mod pipe;
pub use pipe::PipeWake;

cfg_if::cfg_if! {
    if #[cfg(all(any(target_os = "linux", target_os = "android"), not(feature = "force-pipe-wake")))] {
        mod eventfd_linux;
        pub use eventfd_linux::EventFdWake;
        pub use eventfd_linux::EventFdWake as PlatformWake;
    } else {
        pub use pipe::PipeWake as PlatformWake;
    }
}

/// Create the platform's preferred wake signal.
pub fn new_wake_signal() -> SockResult<Box<dyn WakeSignal>> {
    Ok(Box::new(PlatformWake::create()?))
}
