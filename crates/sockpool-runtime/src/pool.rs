//! # Pool: the background socket poller
//!
//! The pool owns one dedicated poller thread. It:
//! 1. Snapshots the active set (plus the wake signal) under the pool lock
//! 2. Waits in `poll(2)` with the lock released
//! 3. Resets the wake signal and checks for shutdown when it fired
//! 4. Reads every readable member dry, appending into its `Buffer`
//! 5. Evicts members that hit EOF, a read error, or became invalid
//!
//! All per-connection mutable state lives in `PoolInner` behind a single
//! mutex shared with every foreground `Socket` call. The poller never
//! holds that mutex while blocked.

use std::collections::{BTreeSet, HashMap};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use sockpool_core::buffer::Buffer;
use sockpool_core::constants::NO_ERROR;
use sockpool_core::error::SockResult;
use sockpool_core::state::{Framing, SocketState};
use sockpool_core::{log_debug, log_info, log_trace, log_warn};

use crate::addr::AddrRef;
use crate::config::PoolConfig;
use crate::socket::Socket;
use crate::sys::{self, INVALID_FD};
use crate::task::{BackgroundTask, TaskContext};
use crate::wake::{self, WakeSignal};

/// Pool-internal connection identifier.
pub(crate) type ConnId = u64;

/// Cap on reads per member per wakeup, so one busy peer cannot pin the
/// lock.
const MAX_READS_PER_WAKE: usize = 64;

/// Mutable state of one connection. Only touched under the pool lock.
pub(crate) struct ConnState {
    pub(crate) fd: RawFd,
    pub(crate) error: i32,
    pub(crate) state: SocketState,
    pub(crate) local: Option<AddrRef>,
    pub(crate) remote: Option<AddrRef>,
    pub(crate) tag: String,
    pub(crate) incoming: Buffer,
}

impl ConnState {
    pub(crate) fn new(fd: RawFd, framing: Framing) -> Self {
        Self {
            fd,
            error: NO_ERROR,
            state: if fd == INVALID_FD { SocketState::Invalid } else { SocketState::Unbound },
            local: None,
            remote: None,
            tag: String::new(),
            incoming: Buffer::new(framing),
        }
    }

    #[inline]
    pub(crate) fn is_valid(&self) -> bool {
        self.fd != INVALID_FD
    }

    /// Release the descriptor and go terminal. No-op when already invalid.
    ///
    /// Returns `true` if a descriptor was actually closed.
    pub(crate) fn release(&mut self) -> bool {
        if self.fd == INVALID_FD {
            self.state = SocketState::Invalid;
            return false;
        }
        let rc = sys::close(self.fd);
        if rc != NO_ERROR {
            self.error = rc;
        }
        self.fd = INVALID_FD;
        self.state = SocketState::Invalid;
        true
    }
}

/// Everything guarded by the pool lock.
pub(crate) struct PoolInner {
    pub(crate) conns: HashMap<ConnId, ConnState>,
    pub(crate) active: BTreeSet<ConnId>,
    next_id: ConnId,
}

impl PoolInner {
    fn new() -> Self {
        Self {
            conns: HashMap::new(),
            active: BTreeSet::new(),
            next_id: 1,
        }
    }

    /// Force-close `id` and drop it from the active set.
    ///
    /// Idempotent: a second call finds no descriptor and no membership.
    pub(crate) fn force_close(&mut self, id: ConnId) -> bool {
        let closed = match self.conns.get_mut(&id) {
            Some(conn) => conn.release(),
            None => false,
        };
        let evicted = self.active.remove(&id);
        closed || evicted
    }

    /// Drop members that are gone or no longer pollable.
    fn evict_dead(&mut self) -> u64 {
        let conns = &self.conns;
        let before = self.active.len();
        self.active.retain(|id| {
            conns
                .get(id)
                .is_some_and(|c| c.is_valid() && c.state.is_pollable())
        });
        (before - self.active.len()) as u64
    }
}

#[derive(Default)]
struct StatsCounters {
    iterations: AtomicU64,
    wakeups: AtomicU64,
    bytes_in: AtomicU64,
    evictions: AtomicU64,
}

/// Counters from the poller, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Completed readiness waits
    pub iterations: u64,
    /// Times the wake signal was found raised
    pub wakeups: u64,
    /// Bytes appended into connection buffers
    pub bytes_in: u64,
    /// Members dropped from the active set
    pub evictions: u64,
}

/// State shared by the pool handle, its poller and every socket.
pub(crate) struct PoolShared {
    inner: Mutex<PoolInner>,
    wake: Box<dyn WakeSignal>,
    pub(crate) config: PoolConfig,
    stats: StatsCounters,
}

impl PoolShared {
    /// Take the pool lock. A panic on another thread does not wedge the pool.
    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Interrupt the poller's current wait.
    pub(crate) fn wake(&self) {
        if let Err(e) = self.wake.signal() {
            log_warn!("{}", e);
        }
    }

    /// Track a new connection (not yet pollable).
    pub(crate) fn insert(&self, conn: ConnState) -> ConnId {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.conns.insert(id, conn);
        id
    }

    /// Register `id` for readiness waiting.
    pub(crate) fn add(&self, id: ConnId) {
        let added = {
            let mut inner = self.lock();
            inner.conns.get(&id).is_some_and(ConnState::is_valid) && inner.active.insert(id)
        };
        if added {
            log_trace!("conn {} joined the pool", id);
            self.wake();
        }
    }

    /// Close `id` and make sure no further poll cycle touches it.
    pub(crate) fn force_close(&self, id: ConnId) -> bool {
        let changed = self.lock().force_close(id);
        if changed {
            log_trace!("conn {} force-closed", id);
            self.wake();
        }
        changed
    }

    /// Forget `id` entirely, closing it first if needed. Releases its
    /// address references.
    pub(crate) fn dispose(&self, id: ConnId) {
        let removed = {
            let mut inner = self.lock();
            inner.force_close(id);
            inner.conns.remove(&id)
        };
        if removed.is_some() {
            self.wake();
        }
        // address refs and buffered chunks drop here, outside the lock
        drop(removed);
    }
}

/// Socket pool with its background poller.
///
/// Sockets created by a pool keep its shared state alive, so they stay
/// usable (minus background reads) after the pool shuts down.
pub struct Pool {
    shared: Arc<PoolShared>,
    task: BackgroundTask,
}

impl Pool {
    /// Create the pool and start its poller.
    pub fn new(config: PoolConfig) -> SockResult<Self> {
        config.validate()?;

        let shared = Arc::new(PoolShared {
            inner: Mutex::new(PoolInner::new()),
            wake: wake::new_wake_signal()?,
            config,
            stats: StatsCounters::default(),
        });

        let poller_shared = Arc::clone(&shared);
        let mut task = BackgroundTask::new(shared.config.thread_name.clone(), move |ctx| {
            poll_loop(poller_shared, ctx);
        });
        task.start()?;

        Ok(Self { shared, task })
    }

    /// Pool configured from library defaults and the environment.
    pub fn from_env() -> SockResult<Self> {
        Self::new(PoolConfig::from_env())
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Whether the poller thread is still running.
    pub fn is_running(&self) -> bool {
        self.task.is_active()
    }

    /// Number of connections in the active (polled) set.
    pub fn active_count(&self) -> usize {
        self.shared.lock().active.len()
    }

    /// Number of live socket handles tracked by the pool.
    pub fn connection_count(&self) -> usize {
        self.shared.lock().conns.len()
    }

    pub fn stats(&self) -> PoolStats {
        let s = &self.shared.stats;
        PoolStats {
            iterations: s.iterations.load(Ordering::Relaxed),
            wakeups: s.wakeups.load(Ordering::Relaxed),
            bytes_in: s.bytes_in.load(Ordering::Relaxed),
            evictions: s.evictions.load(Ordering::Relaxed),
        }
    }

    /// Allocate a socket. Never fails: an allocation error yields a
    /// permanently invalid socket carrying the platform error.
    pub fn create(&self, domain: i32, sock_type: i32, protocol: i32) -> Socket {
        Socket::open(Arc::clone(&self.shared), domain, sock_type, protocol)
    }

    pub fn create_tcp(&self) -> Socket {
        self.create(libc::AF_INET, libc::SOCK_STREAM, 0)
    }

    pub fn create_udp(&self) -> Socket {
        self.create(libc::AF_INET, libc::SOCK_DGRAM, 0)
    }

    pub fn create_tcp_v6(&self) -> Socket {
        self.create(libc::AF_INET6, libc::SOCK_STREAM, 0)
    }

    pub fn create_udp_v6(&self) -> Socket {
        self.create(libc::AF_INET6, libc::SOCK_DGRAM, 0)
    }

    pub(crate) fn shared(&self) -> &Arc<PoolShared> {
        &self.shared
    }

    /// Stop the poller, waiting at most `shutdown_grace` for it.
    ///
    /// Returns `false` if the poller had to be abandoned.
    pub fn shutdown(&mut self) -> bool {
        self.task.stop();
        self.shared.wake();
        let joined = self.task.join_timeout(self.shared.config.shutdown_grace);
        if joined {
            log_info!("pool shut down");
        }
        joined
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The poller loop, run on the pool's background thread.
fn poll_loop(shared: Arc<PoolShared>, ctx: TaskContext) {
    log_info!("poller started (timeout {:?})", shared.config.poll_timeout);

    let mut scratch = vec![0u8; shared.config.recv_chunk];
    let mut fds: Vec<libc::pollfd> = Vec::new();
    let mut members: Vec<(ConnId, RawFd)> = Vec::new();

    while !ctx.is_stopped() {
        // ── Step 1: snapshot the active set ──
        fds.clear();
        members.clear();
        fds.push(libc::pollfd {
            fd: shared.wake.fd(),
            events: libc::POLLIN,
            revents: 0,
        });
        {
            let mut inner = shared.lock();
            let evicted = inner.evict_dead();
            if evicted > 0 {
                shared.stats.evictions.fetch_add(evicted, Ordering::Relaxed);
            }
            for &id in &inner.active {
                if let Some(conn) = inner.conns.get(&id) {
                    fds.push(libc::pollfd {
                        fd: conn.fd,
                        events: libc::POLLIN,
                        revents: 0,
                    });
                    members.push((id, conn.fd));
                }
            }
        }

        // ── Step 2: wait, lock released ──
        match sys::poll(&mut fds, shared.config.poll_timeout) {
            Ok(_) => {}
            Err(e) if e == libc::EINTR => continue,
            Err(e) => {
                log_warn!("poll failed: {}", sys::errno_string(e));
                thread::sleep(shared.config.poll_timeout);
                continue;
            }
        }
        shared.stats.iterations.fetch_add(1, Ordering::Relaxed);

        // ── Step 3: wake signal / shutdown ──
        if fds[0].revents != 0 {
            shared.wake.reset();
            shared.stats.wakeups.fetch_add(1, Ordering::Relaxed);
            if ctx.is_stopped() {
                break;
            }
        }

        // ── Step 4/5: drain readable members, evicting dead ones ──
        if fds[1..].iter().all(|p| p.revents == 0) {
            continue;
        }
        let mut inner = shared.lock();
        for (pfd, &(id, fd)) in fds[1..].iter().zip(&members) {
            if pfd.revents == 0 {
                continue;
            }
            drain_member(&shared, &mut inner, id, fd, pfd.revents, &mut scratch);
        }
    }

    log_info!("poller stopped");
    ctx.exit();
}

/// Read everything currently available on one member. Lock held.
fn drain_member(
    shared: &PoolShared,
    inner: &mut PoolInner,
    id: ConnId,
    fd: RawFd,
    revents: libc::c_short,
    scratch: &mut [u8],
) {
    // membership may have changed while we were waiting
    if !inner.active.contains(&id) {
        return;
    }
    let Some(conn) = inner.conns.get_mut(&id) else {
        return;
    };
    if conn.fd != fd {
        return;
    }

    let stream = conn.incoming.framing().is_stream();
    let mut evict = revents & libc::POLLNVAL != 0;
    let mut eof = false;

    if !evict {
        for _ in 0..MAX_READS_PER_WAKE {
            match sys::recv(fd, scratch) {
                Ok(0) if stream => {
                    conn.incoming.append(&[]);
                    eof = true;
                    evict = true;
                    break;
                }
                Ok(n) => {
                    conn.incoming.append(&scratch[..n]);
                    shared.stats.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
                    log_trace!("conn {} read {} bytes", id, n);
                    if stream && n < scratch.len() {
                        break;
                    }
                }
                Err(e) if e == libc::EINTR => continue,
                Err(e) if sys::is_would_block(e) => break,
                Err(e) => {
                    conn.incoming.set_error(e);
                    evict = true;
                    log_debug!("conn {} read failed: {}", id, sys::errno_string(e));
                    break;
                }
            }
        }
    }

    if !evict {
        return;
    }

    // a close was already requested: the peer's answer finishes it
    if conn.state == SocketState::ClosingGraceful {
        conn.release();
    }
    inner.active.remove(&id);
    shared.stats.evictions.fetch_add(1, Ordering::Relaxed);
    log_debug!("conn {} evicted ({})", id, if eof { "eof" } else { "error" });
}
