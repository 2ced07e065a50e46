//! Thin libc wrappers for the socket syscalls
//!
//! Every wrapper returns `Err(errno)` on failure, with errno read
//! immediately after the call. Data transfer always passes `MSG_DONTWAIT`;
//! `connect` and `accept` follow the descriptor's mode, which the pool keeps
//! non-blocking outside a synchronous connect.

use std::os::unix::io::RawFd;
use std::time::Duration;

use nix::errno::Errno;

use crate::addr::RawAddr;

/// Descriptor value of a closed / never-opened socket.
pub const INVALID_FD: RawFd = -1;

/// Result of a raw syscall: value or errno.
pub type SysResult<T> = Result<T, i32>;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd", target_os = "dragonfly"))] {
        /// Never raise SIGPIPE when the peer has gone away.
        const NOSIGNAL: libc::c_int = libc::MSG_NOSIGNAL;
    } else {
        const NOSIGNAL: libc::c_int = 0;
    }
}

/// Sends run under the pool lock: they must not block even while a
/// blocking `connect` has the descriptor in blocking mode.
const SEND_FLAGS: libc::c_int = NOSIGNAL | libc::MSG_DONTWAIT;

/// errno of the last failed call on this thread.
#[inline]
pub fn last_errno() -> i32 {
    Errno::last() as i32
}

/// Human readable text for an error code (0 renders as "no error").
pub fn errno_string(code: i32) -> String {
    if code == 0 {
        return "no error".to_string();
    }
    Errno::from_raw(code).desc().to_string()
}

/// "Try again later" condition.
#[inline]
pub fn is_would_block(code: i32) -> bool {
    code == libc::EAGAIN || code == libc::EWOULDBLOCK
}

/// Non-blocking connect still underway.
#[inline]
pub fn is_in_progress(code: i32) -> bool {
    code == libc::EINPROGRESS || code == libc::EALREADY
}

#[inline]
fn check(ret: libc::c_int) -> SysResult<libc::c_int> {
    if ret < 0 {
        Err(last_errno())
    } else {
        Ok(ret)
    }
}

#[inline]
fn check_size(ret: libc::ssize_t) -> SysResult<usize> {
    if ret < 0 {
        Err(last_errno())
    } else {
        Ok(ret as usize)
    }
}

pub fn socket(domain: i32, sock_type: i32, protocol: i32) -> SysResult<RawFd> {
    check(unsafe { libc::socket(domain, sock_type, protocol) })
}

/// Switch `O_NONBLOCK` on or off.
pub fn set_nonblocking(fd: RawFd, nonblocking: bool) -> SysResult<()> {
    let flags = check(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    let flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    check(unsafe { libc::fcntl(fd, libc::F_SETFL, flags) })?;
    Ok(())
}

/// Close a descriptor, returning the errno of `close` itself (0 on success).
pub fn close(fd: RawFd) -> i32 {
    match check(unsafe { libc::close(fd) }) {
        Ok(_) => 0,
        Err(e) => e,
    }
}

pub fn shutdown_write(fd: RawFd) -> SysResult<()> {
    check(unsafe { libc::shutdown(fd, libc::SHUT_WR) })?;
    Ok(())
}

pub fn bind(fd: RawFd, addr: &RawAddr) -> SysResult<()> {
    check(unsafe { libc::bind(fd, addr.as_ptr(), addr.len()) })?;
    Ok(())
}

pub fn listen(fd: RawFd, backlog: i32) -> SysResult<()> {
    check(unsafe { libc::listen(fd, backlog) })?;
    Ok(())
}

pub fn connect(fd: RawFd, addr: &RawAddr) -> SysResult<()> {
    check(unsafe { libc::connect(fd, addr.as_ptr(), addr.len()) })?;
    Ok(())
}

/// Accept one pending connection. The peer address is not kept.
pub fn accept(fd: RawFd) -> SysResult<RawFd> {
    let mut peer = RawAddr::zeroed();
    let (ptr, len) = peer.as_out();
    check(unsafe { libc::accept(fd, ptr, len) })
}

pub fn send(fd: RawFd, buf: &[u8]) -> SysResult<usize> {
    check_size(unsafe { libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), SEND_FLAGS) })
}

pub fn send_to(fd: RawFd, buf: &[u8], addr: &RawAddr) -> SysResult<usize> {
    check_size(unsafe {
        libc::sendto(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            SEND_FLAGS,
            addr.as_ptr(),
            addr.len(),
        )
    })
}

/// Non-blocking read, whatever mode the descriptor is in.
pub fn recv(fd: RawFd, buf: &mut [u8]) -> SysResult<usize> {
    check_size(unsafe {
        libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), libc::MSG_DONTWAIT)
    })
}

/// Non-blocking read that also reports the source address.
pub fn recv_from(fd: RawFd, buf: &mut [u8]) -> SysResult<(usize, RawAddr)> {
    let mut source = RawAddr::zeroed();
    let (ptr, len) = source.as_out();
    let n = check_size(unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            libc::MSG_DONTWAIT,
            ptr,
            len,
        )
    })?;
    Ok((n, source))
}

pub fn local_addr(fd: RawFd) -> SysResult<RawAddr> {
    let mut addr = RawAddr::zeroed();
    let (ptr, len) = addr.as_out();
    check(unsafe { libc::getsockname(fd, ptr, len) })?;
    Ok(addr)
}

pub fn peer_addr(fd: RawFd) -> SysResult<RawAddr> {
    let mut addr = RawAddr::zeroed();
    let (ptr, len) = addr.as_out();
    check(unsafe { libc::getpeername(fd, ptr, len) })?;
    Ok(addr)
}

/// Integer-valued `getsockopt`.
pub fn get_option(fd: RawFd, level: i32, option: i32) -> SysResult<i32> {
    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    check(unsafe {
        libc::getsockopt(fd, level, option, &mut value as *mut libc::c_int as *mut libc::c_void, &mut len)
    })?;
    Ok(value)
}

/// Integer-valued `setsockopt`.
pub fn set_option(fd: RawFd, level: i32, option: i32, value: i32) -> SysResult<()> {
    let value: libc::c_int = value;
    check(unsafe {
        libc::setsockopt(
            fd,
            level,
            option,
            &value as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })?;
    Ok(())
}

/// Wait up to `timeout` for `fd` to become readable (or hung up).
pub fn poll_readable(fd: RawFd, timeout: Duration) -> SysResult<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // poll() has millisecond resolution; round sub-millisecond waits up
    let ms = timeout.as_micros().div_ceil(1000).min(i32::MAX as u128) as libc::c_int;
    let n = check(unsafe { libc::poll(&mut pfd, 1, ms) })?;
    Ok(n > 0)
}

/// `poll(2)` over a prepared set. Returns the number of ready entries.
pub fn poll(fds: &mut [libc::pollfd], timeout: Duration) -> SysResult<usize> {
    let ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
    let n = check(unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, ms) })?;
    Ok(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_string() {
        assert_eq!(errno_string(0), "no error");
        assert!(!errno_string(libc::ECONNREFUSED).is_empty());
        assert_ne!(errno_string(libc::ECONNREFUSED), errno_string(libc::EPIPE));
    }

    #[test]
    fn test_error_classes() {
        assert!(is_would_block(libc::EAGAIN));
        assert!(is_would_block(libc::EWOULDBLOCK));
        assert!(!is_would_block(libc::ECONNRESET));
        assert!(is_in_progress(libc::EINPROGRESS));
        assert!(is_in_progress(libc::EALREADY));
        assert!(!is_in_progress(0));
    }

    #[test]
    fn test_nonblocking_recv_would_block() {
        let fd = socket(libc::AF_INET, libc::SOCK_DGRAM, 0).unwrap();
        set_nonblocking(fd, true).unwrap();
        let any: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
        bind(fd, &RawAddr::from_socket_addr(&any)).unwrap();

        let mut buf = [0u8; 16];
        let err = recv(fd, &mut buf).unwrap_err();
        assert!(is_would_block(err));
        assert!(!poll_readable(fd, Duration::from_micros(200)).unwrap());
        assert_eq!(close(fd), 0);
    }

    #[test]
    fn test_int_options() {
        let fd = socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        set_option(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, 1).unwrap();
        assert_ne!(get_option(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR).unwrap(), 0);
        assert_eq!(get_option(fd, libc::SOL_SOCKET, libc::SO_TYPE).unwrap(), libc::SOCK_STREAM);
        close(fd);
    }

    #[test]
    fn test_close_invalid_reports_ebadf() {
        assert_eq!(close(INVALID_FD), libc::EBADF);
    }
}
