//! Pool-managed socket handle
//!
//! A `Socket` is the foreground half of one connection. Its mutable state
//! (descriptor, last error, cached addresses, tag, inbound buffer) lives in
//! the pool and is only touched under the pool lock; the handle itself
//! carries the immutable identity.
//!
//! Network failures never surface as `Err`. Operations return `bool` or
//! `Option` and leave the platform error code in `last_error()`. A failed
//! call with `last_error() == 0` is the retry signal: nothing is wrong, try
//! again later.
//!
//! Dropping the handle closes the descriptor (if still open), removes the
//! connection from the pool and releases its address references.

use std::fmt;
use std::sync::Arc;

use sockpool_core::constants::NO_ERROR;
use sockpool_core::state::{Framing, SocketState};
use sockpool_core::{log_debug, log_trace, log_warn};

use crate::addr::{AddrRef, SockAddr};
use crate::pool::{ConnId, ConnState, PoolShared};
use crate::sys::{self, INVALID_FD};

/// Framing follows the socket type: byte streams get NUL framing,
/// everything else keeps datagram boundaries.
pub fn framing_for(sock_type: i32) -> Framing {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    let base = sock_type & !(libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC);
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let base = sock_type;

    if base == libc::SOCK_STREAM {
        Framing::Stream
    } else {
        Framing::Datagram
    }
}

/// Handle to one pool-managed connection.
pub struct Socket {
    pool: Arc<PoolShared>,
    id: ConnId,
    domain: i32,
    sock_type: i32,
    protocol: i32,
    framing: Framing,
}

impl Socket {
    /// Allocate a non-blocking descriptor and track it in the pool.
    pub(crate) fn open(pool: Arc<PoolShared>, domain: i32, sock_type: i32, protocol: i32) -> Self {
        let framing = framing_for(sock_type);
        let (fd, error) = match sys::socket(domain, sock_type, protocol) {
            Ok(fd) => match sys::set_nonblocking(fd, true) {
                Ok(()) => (fd, NO_ERROR),
                Err(e) => {
                    sys::close(fd);
                    (INVALID_FD, e)
                }
            },
            Err(e) => (INVALID_FD, e),
        };
        if error != NO_ERROR {
            log_debug!("socket({}, {}, {}) failed: {}", domain, sock_type, protocol, sys::errno_string(error));
        }

        let mut conn = ConnState::new(fd, framing);
        conn.error = error;
        Self::attach(pool, conn, domain, sock_type, protocol)
    }

    /// Track an already-built connection state.
    pub(crate) fn attach(
        pool: Arc<PoolShared>,
        conn: ConnState,
        domain: i32,
        sock_type: i32,
        protocol: i32,
    ) -> Self {
        let framing = conn.incoming.framing();
        let id = pool.insert(conn);
        Self {
            pool,
            id,
            domain,
            sock_type,
            protocol,
            framing,
        }
    }

    /// Run `f` on this socket's state under the pool lock.
    fn with_conn<R>(&self, f: impl FnOnce(&mut ConnState) -> R) -> Option<R> {
        let mut inner = self.pool.lock();
        inner.conns.get_mut(&self.id).map(f)
    }

    /// Run `f` on a valid descriptor under the pool lock. An invalid socket
    /// records `EBADF` and yields `None`.
    fn with_fd<R>(&self, f: impl FnOnce(&mut ConnState, i32) -> R) -> Option<R> {
        self.with_conn(|conn| {
            if conn.is_valid() {
                let fd = conn.fd;
                Some(f(conn, fd))
            } else {
                conn.error = libc::EBADF;
                None
            }
        })
        .flatten()
    }

    // ── Identity ──

    pub fn domain(&self) -> i32 {
        self.domain
    }

    pub fn sock_type(&self) -> i32 {
        self.sock_type
    }

    pub fn protocol(&self) -> i32 {
        self.protocol
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Raw descriptor, or `-1` once closed.
    pub fn fd(&self) -> i32 {
        self.with_conn(|c| c.fd).unwrap_or(INVALID_FD)
    }

    pub fn is_valid(&self) -> bool {
        self.with_conn(|c| c.is_valid()).unwrap_or(false)
    }

    pub fn state(&self) -> SocketState {
        self.with_conn(|c| c.state).unwrap_or(SocketState::Invalid)
    }

    /// Platform error code of the last operation (0 = none).
    pub fn last_error(&self) -> i32 {
        self.with_conn(|c| c.error).unwrap_or(libc::EBADF)
    }

    /// Human readable form of `last_error()`.
    pub fn error_string(&self) -> String {
        sys::errno_string(self.last_error())
    }

    pub fn tag(&self) -> String {
        self.with_conn(|c| c.tag.clone()).unwrap_or_default()
    }

    pub fn set_tag(&self, tag: impl Into<String>) {
        let tag = tag.into();
        self.with_conn(|c| c.tag = tag);
    }

    /// Local address, resolved on first access and cached.
    pub fn local(&self) -> Option<AddrRef> {
        self.with_conn(|conn| {
            if conn.local.is_none() && conn.is_valid() {
                match sys::local_addr(conn.fd) {
                    Ok(raw) => conn.local = Some(SockAddr::from_raw(raw).shared()),
                    Err(e) => conn.error = e,
                }
            }
            conn.local.clone()
        })
        .flatten()
    }

    /// Peer address, resolved on first access and cached.
    pub fn remote(&self) -> Option<AddrRef> {
        self.with_conn(|conn| {
            if conn.remote.is_none() && conn.is_valid() {
                match sys::peer_addr(conn.fd) {
                    Ok(raw) => conn.remote = Some(SockAddr::from_raw(raw).shared()),
                    Err(e) => conn.error = e,
                }
            }
            conn.remote.clone()
        })
        .flatten()
    }

    #[cfg(test)]
    pub(crate) fn id(&self) -> ConnId {
        self.id
    }

    /// Cached addresses (unresolved ones stay `None`), last error and tag.
    pub(crate) fn persisted_parts(&self) -> (Option<AddrRef>, Option<AddrRef>, i32, String) {
        self.with_conn(|c| (c.local.clone(), c.remote.clone(), c.error, c.tag.clone()))
            .unwrap_or((None, None, libc::EBADF, String::new()))
    }

    // ── Lifecycle ──

    /// Bind to `addr`. Refreshes a cached local address.
    pub fn bind(&self, addr: &SockAddr) -> bool {
        let raw = addr.raw();
        self.with_fd(|conn, fd| match sys::bind(fd, &raw) {
            Ok(()) => {
                conn.error = NO_ERROR;
                if conn.state == SocketState::Unbound {
                    conn.state = SocketState::Bound;
                }
                if let (Some(local), Ok(bound)) = (&conn.local, sys::local_addr(fd)) {
                    local.set_raw(bound);
                }
                true
            }
            Err(e) => {
                conn.error = e;
                false
            }
        })
        .unwrap_or(false)
    }

    /// Start accepting connections. A negative backlog means the platform
    /// maximum.
    pub fn listen(&self, backlog: i32) -> bool {
        let backlog = if backlog < 0 { libc::SOMAXCONN } else { backlog };
        self.with_fd(|conn, fd| match sys::listen(fd, backlog) {
            Ok(()) => {
                conn.error = NO_ERROR;
                conn.state = SocketState::Listening;
                true
            }
            Err(e) => {
                conn.error = e;
                false
            }
        })
        .unwrap_or(false)
    }

    /// `listen` with the pool's configured backlog.
    pub fn listen_default(&self) -> bool {
        self.listen(self.pool.config.listen_backlog)
    }

    /// Blocking connect. On success the peer address is refreshed and the
    /// socket joins the pool.
    ///
    /// The pool lock is not held while the handshake runs.
    pub fn connect(&self, addr: &SockAddr) -> bool {
        let raw = addr.raw();
        let Some(fd) = self.with_fd(|_, fd| fd) else {
            return false;
        };

        // datagram connect never blocks and the socket may already be polled
        let toggle = self.framing.is_stream();
        if toggle {
            if let Err(e) = sys::set_nonblocking(fd, false) {
                self.with_conn(|c| c.error = e);
                return false;
            }
        }
        let result = sys::connect(fd, &raw);
        if toggle {
            if let Err(e) = sys::set_nonblocking(fd, true) {
                return self.abandon_blocking(e);
            }
        }

        self.finish_connect(result, false)
    }

    /// A descriptor stuck in blocking mode cannot stay in the pool.
    fn abandon_blocking(&self, errno: i32) -> bool {
        log_warn!("conn {} left in blocking mode: {}", self.id, sys::errno_string(errno));
        self.pool.force_close(self.id);
        self.with_conn(|conn| conn.error = errno);
        false
    }

    /// Non-blocking connect.
    ///
    /// A handshake still underway reports `false` with `last_error() == 0`;
    /// the socket joins the pool right away either way.
    pub fn connect_async(&self, addr: &SockAddr) -> bool {
        let raw = addr.raw();
        let Some(result) = self.with_fd(|_, fd| sys::connect(fd, &raw)) else {
            return false;
        };
        self.finish_connect(result, true)
    }

    fn finish_connect(&self, result: sys::SysResult<()>, allow_pending: bool) -> bool {
        let outcome = self.with_conn(|conn| {
            let connected = match result {
                Ok(()) => true,
                Err(e) if e == libc::EISCONN => true,
                Err(e) if allow_pending && sys::is_in_progress(e) => false,
                Err(e) => {
                    conn.error = e;
                    return None;
                }
            };
            if !conn.is_valid() {
                conn.error = libc::EBADF;
                return None;
            }
            conn.error = NO_ERROR;
            conn.state = SocketState::Connected;
            if connected {
                if let Ok(peer) = sys::peer_addr(conn.fd) {
                    match &conn.remote {
                        Some(remote) => remote.set_raw(peer),
                        None => conn.remote = Some(SockAddr::from_raw(peer).shared()),
                    }
                }
            }
            Some(connected)
        });

        match outcome.flatten() {
            Some(connected) => {
                self.pool.add(self.id);
                connected
            }
            None => false,
        }
    }

    /// Accept one pending connection.
    ///
    /// `None` with `last_error() == 0` means nothing is pending. The new
    /// socket is non-blocking, already in the pool, and resolves its
    /// addresses lazily.
    pub fn accept(&self) -> Option<Socket> {
        let accepted = self
            .with_fd(|conn, fd| loop {
                match sys::accept(fd) {
                    Ok(new_fd) => {
                        if let Err(e) = sys::set_nonblocking(new_fd, true) {
                            sys::close(new_fd);
                            conn.error = e;
                            return None;
                        }
                        conn.error = NO_ERROR;
                        return Some(new_fd);
                    }
                    Err(e) if e == libc::EINTR => continue,
                    Err(e) if sys::is_would_block(e) || e == libc::ECONNABORTED => {
                        conn.error = NO_ERROR;
                        return None;
                    }
                    Err(e) => {
                        conn.error = e;
                        return None;
                    }
                }
            })
            .flatten()?;

        let mut conn = ConnState::new(accepted, self.framing);
        conn.state = SocketState::Connected;
        let socket = Socket::attach(
            Arc::clone(&self.pool),
            conn,
            self.domain,
            self.sock_type,
            self.protocol,
        );
        self.pool.add(socket.id);
        log_trace!("conn {} accepted conn {}", self.id, socket.id);
        Some(socket)
    }

    /// Close the socket.
    ///
    /// A connected stream socket half-closes and waits up to the pool's
    /// `close_linger` for the peer. If the peer answers in time the poller
    /// finishes the teardown when it sees the peer's close; otherwise the
    /// descriptor is released right away. Everything else is released
    /// immediately. Already buffered data stays readable.
    pub fn close(&self) {
        let graceful = self
            .with_conn(|conn| {
                if !conn.is_valid() {
                    return None;
                }
                if !self.framing.is_stream() || conn.state != SocketState::Connected {
                    return Some(None);
                }
                match sys::shutdown_write(conn.fd) {
                    Ok(()) => {
                        conn.state = SocketState::ClosingGraceful;
                        Some(Some(conn.fd))
                    }
                    Err(e) => {
                        conn.error = e;
                        Some(None)
                    }
                }
            })
            .flatten();

        let Some(graceful_fd) = graceful else {
            return;
        };

        if let Some(fd) = graceful_fd {
            let answered = sys::poll_readable(fd, self.pool.config.close_linger).unwrap_or(false);
            // the poller only finishes sockets it is still watching
            if answered && self.pool.lock().active.contains(&self.id) {
                log_trace!("conn {} closing gracefully", self.id);
                return;
            }
        }
        self.pool.force_close(self.id);
    }

    // ── Data ──

    /// Send all of `data`.
    ///
    /// Would-block reports `false` with `last_error() == 0`. Bytes already
    /// written by this call are not tracked: retry with the whole message.
    pub fn send(&self, data: &[u8]) -> bool {
        self.transmit(data, |fd, rest| sys::send(fd, rest))
    }

    /// Send `data` to an explicit peer.
    pub fn send_to(&self, data: &[u8], addr: &SockAddr) -> bool {
        let raw = addr.raw();
        self.transmit(data, |fd, rest| sys::send_to(fd, rest, &raw))
    }

    fn transmit(&self, data: &[u8], write: impl Fn(i32, &[u8]) -> sys::SysResult<usize>) -> bool {
        let mut fatal = false;
        let sent_all = self
            .with_fd(|conn, fd| {
                let mut sent = 0;
                while sent < data.len() {
                    match write(fd, &data[sent..]) {
                        Ok(n) => sent += n,
                        Err(e) if e == libc::EINTR => continue,
                        Err(e) if sys::is_would_block(e) => {
                            conn.error = NO_ERROR;
                            return false;
                        }
                        Err(e) => {
                            conn.error = e;
                            fatal = true;
                            return false;
                        }
                    }
                }
                conn.error = NO_ERROR;
                true
            })
            .unwrap_or(false);

        if fatal {
            self.pool.force_close(self.id);
        }
        sent_all
    }

    /// Next message from the inbound buffer.
    ///
    /// Stream sockets return the bytes up to the next NUL; datagram sockets
    /// return one datagram. `None` with `last_error() == 0` means nothing
    /// has arrived yet. On a stream socket an empty message that leaves the
    /// socket invalid is the peer's orderly close.
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.receive(false)
    }

    /// Like `recv`, but returns the whole front chunk, NUL bytes included.
    pub fn recv_data(&self) -> Option<Vec<u8>> {
        self.receive(true)
    }

    fn receive(&self, whole_chunk: bool) -> Option<Vec<u8>> {
        let mut inner = self.pool.lock();
        let conn = inner.conns.get_mut(&self.id)?;

        if conn.incoming.front_is_eof() {
            conn.incoming.pop();
            conn.error = NO_ERROR;
            let closed = inner.force_close(self.id);
            drop(inner);
            if closed {
                self.pool.wake();
            }
            return Some(Vec::new());
        }

        let next = if whole_chunk {
            conn.incoming.pop()
        } else {
            conn.incoming.next_message()
        };
        if let Some(message) = next {
            conn.error = NO_ERROR;
            return Some(message);
        }

        let sticky = conn.incoming.take_error();
        if sticky != NO_ERROR {
            conn.error = sticky;
            let closed = inner.force_close(self.id);
            drop(inner);
            if closed {
                self.pool.wake();
            }
            return None;
        }

        conn.error = if conn.is_valid() { NO_ERROR } else { libc::ENOTCONN };
        None
    }

    /// Read one datagram directly from the descriptor together with its
    /// source address. Bypasses the inbound buffer.
    pub fn recv_from(&self) -> Option<(Vec<u8>, SockAddr)> {
        let mut scratch = vec![0u8; self.pool.config.recv_chunk];
        let mut fatal = false;
        let received = self
            .with_fd(|conn, fd| loop {
                match sys::recv_from(fd, &mut scratch) {
                    Ok((n, source)) => {
                        conn.error = NO_ERROR;
                        return Some((n, source));
                    }
                    Err(e) if e == libc::EINTR => continue,
                    Err(e) if sys::is_would_block(e) => {
                        conn.error = NO_ERROR;
                        return None;
                    }
                    Err(e) => {
                        conn.error = e;
                        fatal = true;
                        return None;
                    }
                }
            })
            .flatten();

        if fatal {
            self.pool.force_close(self.id);
        }
        let (n, source) = received?;
        scratch.truncate(n);
        Some((scratch, SockAddr::from_raw(source)))
    }

    // ── Options ──

    /// Integer-valued socket option.
    pub fn get_option(&self, level: i32, option: i32) -> Option<i32> {
        self.with_fd(|conn, fd| match sys::get_option(fd, level, option) {
            Ok(v) => {
                conn.error = NO_ERROR;
                Some(v)
            }
            Err(e) => {
                conn.error = e;
                None
            }
        })
        .flatten()
    }

    pub fn set_option(&self, level: i32, option: i32, value: i32) -> bool {
        self.with_fd(|conn, fd| match sys::set_option(fd, level, option, value) {
            Ok(()) => {
                conn.error = NO_ERROR;
                true
            }
            Err(e) => {
                conn.error = e;
                false
            }
        })
        .unwrap_or(false)
    }

    /// Bytes waiting in the inbound buffer.
    pub fn buffered(&self) -> usize {
        self.with_conn(|c| c.incoming.buffered_bytes()).unwrap_or(0)
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.pool.dispose(self.id);
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("fd", &self.fd())
            .field("framing", &self.framing)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::Pool;
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    fn pool() -> Pool {
        Pool::new(PoolConfig::new().poll_timeout(Duration::from_millis(20))).unwrap()
    }

    fn loopback() -> SockAddr {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        SockAddr::from(addr)
    }

    #[test]
    fn test_framing_for_type() {
        assert_eq!(framing_for(libc::SOCK_STREAM), Framing::Stream);
        assert_eq!(framing_for(libc::SOCK_DGRAM), Framing::Datagram);
    }

    #[test]
    fn test_create_is_nonblocking_and_unbound() {
        let pool = pool();
        let sock = pool.create_tcp();
        assert!(sock.is_valid());
        assert_eq!(sock.state(), SocketState::Unbound);
        assert_eq!(sock.last_error(), 0);
        assert_eq!(sock.framing(), Framing::Stream);

        let flags = unsafe { libc::fcntl(sock.fd(), libc::F_GETFL) };
        assert_ne!(flags & libc::O_NONBLOCK, 0);
    }

    #[test]
    fn test_create_failure_is_permanently_invalid() {
        let pool = pool();
        let sock = pool.create(-1, libc::SOCK_STREAM, 0);
        assert!(!sock.is_valid());
        assert_eq!(sock.state(), SocketState::Invalid);
        assert_ne!(sock.last_error(), 0);
        assert!(!sock.error_string().is_empty());

        assert!(!sock.send(b"x"));
        assert_eq!(sock.last_error(), libc::EBADF);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_bind_refreshes_local() {
        let pool = pool();
        let sock = pool.create_udp();
        let before = sock.local().unwrap();
        assert!(sock.bind(&loopback()));
        assert_eq!(sock.state(), SocketState::Bound);

        let bound = before.to_socket_addr().unwrap();
        assert!(bound.ip().is_loopback());
        assert_ne!(bound.port(), 0);
        assert!(Arc::ptr_eq(&before, &sock.local().unwrap()));
    }

    #[test]
    fn test_listen_negative_backlog() {
        let pool = pool();
        let sock = pool.create_tcp();
        assert!(sock.bind(&loopback()));
        assert!(sock.listen(-1));
        assert_eq!(sock.state(), SocketState::Listening);
        // listeners are accepted from, not polled
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_accept_nothing_pending_is_retry() {
        let pool = pool();
        let listener = pool.create_tcp();
        assert!(listener.bind(&loopback()));
        assert!(listener.listen_default());
        assert!(listener.accept().is_none());
        assert_eq!(listener.last_error(), 0);
    }

    #[test]
    fn test_connect_refused_reports_error() {
        let pool = pool();
        // grab a free port, then release it
        let spare = pool.create_tcp();
        assert!(spare.bind(&loopback()));
        let target = spare.local().unwrap().to_socket_addr().unwrap();
        spare.close();

        let sock = pool.create_tcp();
        assert!(!sock.connect(&SockAddr::from(target)));
        assert_eq!(sock.last_error(), libc::ECONNREFUSED);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_send_on_blocking_descriptor_does_not_stall_pool() {
        use std::net::TcpListener;
        use std::sync::mpsc;
        use std::thread;

        let pool = pool();
        let peer = TcpListener::bind("127.0.0.1:0").unwrap();
        let sock = pool.create_tcp();
        assert!(sock.connect(&SockAddr::from(peer.local_addr().unwrap())));
        // never read, so the send buffer fills
        let (_held, _) = peer.accept().unwrap();

        // the state a blocking connect on another thread leaves the fd in
        sys::set_nonblocking(sock.fd(), false).unwrap();

        let (tx, rx) = mpsc::channel();
        let sender = thread::spawn(move || {
            let payload = vec![7u8; 32 << 20];
            let sent = sock.send(&payload);
            tx.send((sent, sock.last_error(), sock.is_valid())).unwrap();
            sock
        });

        let (sent, error, valid) = rx.recv_timeout(Duration::from_secs(5)).expect("send blocked");
        assert!(!sent);
        assert_eq!(error, 0);
        assert!(valid);

        // the pool lock was released
        let other = pool.create_udp();
        assert!(other.recv().is_none());
        assert_eq!(other.last_error(), 0);
        drop(sender.join().unwrap());
    }

    #[test]
    fn test_blocking_mode_restore_failure_closes() {
        let pool = pool();
        let listener = pool.create_tcp();
        assert!(listener.bind(&loopback()));
        assert!(listener.listen(1));
        let a = pool.create_tcp();
        assert!(a.connect(&listener.local().unwrap()));
        assert_eq!(pool.active_count(), 1);

        assert!(!a.abandon_blocking(libc::EINVAL));
        assert!(!a.is_valid());
        assert_eq!(a.last_error(), libc::EINVAL);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_recv_empty_is_retry() {
        let pool = pool();
        let sock = pool.create_tcp();
        assert!(sock.recv().is_none());
        assert_eq!(sock.last_error(), 0);
    }

    #[test]
    fn test_sticky_read_error_reported_once() {
        let pool = pool();
        let sock = pool.create_tcp();
        {
            let mut inner = pool.shared().lock();
            let conn = inner.conns.get_mut(&sock.id()).unwrap();
            conn.incoming.set_error(libc::ECONNRESET);
        }

        assert!(sock.recv().is_none());
        assert_eq!(sock.last_error(), libc::ECONNRESET);
        assert!(!sock.is_valid());

        // the socket's code stays, the buffer's does not fire again
        assert!(sock.recv().is_none());
        assert_eq!(sock.last_error(), libc::ENOTCONN);
    }

    #[test]
    fn test_leading_nul_message_is_not_eof() {
        let pool = pool();
        let sock = pool.create_tcp();
        {
            let mut inner = pool.shared().lock();
            let conn = inner.conns.get_mut(&sock.id()).unwrap();
            conn.incoming.append(b"\0next\0");
        }

        assert_eq!(sock.recv(), Some(Vec::new()));
        assert!(sock.is_valid());
        assert_eq!(sock.recv(), Some(b"next".to_vec()));
    }

    #[test]
    fn test_udp_connect_joins_pool() {
        let pool = pool();
        let a = pool.create_udp();
        let b = pool.create_udp();
        assert!(a.bind(&loopback()));
        assert!(b.bind(&loopback()));

        let a_addr = a.local().unwrap();
        assert!(b.connect(&a_addr));
        assert_eq!(b.state(), SocketState::Connected);
        assert_eq!(pool.active_count(), 1);
        assert_eq!(
            b.remote().unwrap().to_socket_addr(),
            a_addr.to_socket_addr()
        );
    }

    #[test]
    fn test_options() {
        let pool = pool();
        let sock = pool.create_tcp();
        assert!(sock.set_option(libc::SOL_SOCKET, libc::SO_REUSEADDR, 1));
        assert_ne!(sock.get_option(libc::SOL_SOCKET, libc::SO_REUSEADDR), Some(0));
        assert_eq!(sock.get_option(libc::SOL_SOCKET, libc::SO_TYPE), Some(libc::SOCK_STREAM));
        assert_eq!(sock.get_option(libc::SOL_SOCKET, -12345), None);
        assert_ne!(sock.last_error(), 0);
    }

    #[test]
    fn test_tag() {
        let pool = pool();
        let sock = pool.create_udp();
        assert_eq!(sock.tag(), "");
        sock.set_tag("upstream");
        assert_eq!(sock.tag(), "upstream");
    }

    #[test]
    fn test_drop_disposes() {
        let pool = pool();
        let sock = pool.create_tcp();
        assert_eq!(pool.connection_count(), 1);
        drop(sock);
        assert_eq!(pool.connection_count(), 0);
    }

    #[test]
    fn test_datagram_close_is_immediate() {
        let pool = pool();
        let sock = pool.create_udp();
        assert!(sock.bind(&loopback()));

        let start = Instant::now();
        sock.close();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(!sock.is_valid());

        // closing again is a no-op
        sock.close();
        assert_eq!(sock.state(), SocketState::Invalid);
    }
}
