//! `PipeWake` - self-pipe wake signal (portable Unix)
//!
//! The read end goes into the poll set. `signal()` writes one byte;
//! `reset()` drains the pipe. Both ends are non-blocking, so a full pipe
//! simply means a wakeup is already pending.

use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};

use sockpool_core::error::{SockError, SockResult};

use super::WakeSignal;
use crate::sys;

pub struct PipeWake {
    read: OwnedFd,
    write: OwnedFd,
}

impl PipeWake {
    pub fn create() -> SockResult<Self> {
        let (read, write) = nix::unistd::pipe().map_err(|e| SockError::WakeSetup(e as i32))?;
        for fd in [read.as_raw_fd(), write.as_raw_fd()] {
            sys::set_nonblocking(fd, true).map_err(SockError::WakeSetup)?;
            unsafe {
                libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            }
        }
        Ok(Self { read, write })
    }
}

impl WakeSignal for PipeWake {
    fn fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    fn signal(&self) -> SockResult<()> {
        let byte = [1u8];
        let ret = unsafe { libc::write(self.write.as_raw_fd(), byte.as_ptr() as *const libc::c_void, 1) };
        if ret < 0 {
            let errno = sys::last_errno();
            if sys::is_would_block(errno) {
                return Ok(());
            }
            return Err(SockError::WakeSignal(errno));
        }
        Ok(())
    }

    fn reset(&self) {
        let mut scratch = [0u8; 64];
        loop {
            let n = unsafe {
                libc::read(
                    self.read.as_raw_fd(),
                    scratch.as_mut_ptr() as *mut libc::c_void,
                    scratch.len(),
                )
            };
            if n <= 0 {
                break;
            }
        }
    }
}
