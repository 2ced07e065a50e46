//! `EventFdWake` - eventfd-backed wake signal (Linux)
//!
//! `signal()` adds 1 to the eventfd counter; `reset()` reads the counter
//! back to zero. Multiple signals between resets collapse into one wakeup.

use std::os::unix::io::RawFd;

use sockpool_core::error::{SockError, SockResult};

use super::WakeSignal;
use crate::sys;

pub struct EventFdWake {
    fd: RawFd,
}

impl EventFdWake {
    /// Create a new non-blocking, close-on-exec eventfd.
    pub fn create() -> SockResult<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(SockError::WakeSetup(sys::last_errno()));
        }
        Ok(Self { fd })
    }
}

impl WakeSignal for EventFdWake {
    fn fd(&self) -> RawFd {
        self.fd
    }

    fn signal(&self) -> SockResult<()> {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd,
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let errno = sys::last_errno();
            // Counter saturated: a wakeup is already pending.
            if sys::is_would_block(errno) {
                return Ok(());
            }
            return Err(SockError::WakeSignal(errno));
        }
        Ok(())
    }

    fn reset(&self) {
        let mut val: u64 = 0;
        unsafe {
            libc::read(
                self.fd,
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            );
        }
    }
}

impl Drop for EventFdWake {
    fn drop(&mut self) {
        if self.fd >= 0 {
            sys::close(self.fd);
            self.fd = sys::INVALID_FD;
        }
    }
}
