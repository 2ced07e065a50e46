//! Socket address values
//!
//! `RawAddr` is the fixed-size platform address (`sockaddr_storage` plus
//! its length) that the syscalls read and write. `SockAddr` is the shared
//! address object handed to callers: sockets keep an `AddrRef` (a strong
//! reference) to their resolved local/remote addresses and refresh it in
//! place.
//!
//! `AddrRegistry` is an in-memory implementation of the host's key
//! collaborator, used to persist and restore address references.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sockpool_core::collab::{ObjectKey, ObjectKeys};

/// Shared ownership token for an address value.
pub type AddrRef = Arc<SockAddr>;

/// Platform socket address: `sockaddr_storage` and the used length.
#[derive(Clone, Copy)]
pub struct RawAddr {
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
}

impl RawAddr {
    /// All-zero address with the full storage length (`AF_UNSPEC`).
    pub fn zeroed() -> Self {
        Self {
            // Safety: sockaddr_storage is plain old data; all-zero is AF_UNSPEC
            storage: unsafe { mem::zeroed() },
            len: mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t,
        }
    }

    pub fn family(&self) -> i32 {
        self.storage.ss_family as i32
    }

    #[inline]
    pub fn len(&self) -> libc::socklen_t {
        self.len
    }

    #[inline]
    pub fn is_unspecified(&self) -> bool {
        self.family() == libc::AF_UNSPEC
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const libc::sockaddr {
        &self.storage as *const libc::sockaddr_storage as *const libc::sockaddr
    }

    /// Out-parameter pair for `accept`/`recvfrom`/`getsockname`.
    /// The length is reset to the full storage size first.
    #[inline]
    pub(crate) fn as_out(&mut self) -> (*mut libc::sockaddr, *mut libc::socklen_t) {
        self.len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        (
            &mut self.storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
            &mut self.len as *mut libc::socklen_t,
        )
    }

    pub fn from_socket_addr(addr: &SocketAddr) -> Self {
        let mut raw = Self::zeroed();
        match addr {
            SocketAddr::V4(v4) => {
                // Safety: sockaddr_storage is large enough and aligned for sockaddr_in
                let sin = unsafe {
                    &mut *(&mut raw.storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in)
                };
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_port = v4.port().to_be();
                sin.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
                #[cfg(any(
                    target_os = "macos",
                    target_os = "ios",
                    target_os = "freebsd",
                    target_os = "openbsd",
                    target_os = "netbsd",
                    target_os = "dragonfly"
                ))]
                {
                    sin.sin_len = mem::size_of::<libc::sockaddr_in>() as u8;
                }
                raw.len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            }
            SocketAddr::V6(v6) => {
                // Safety: as above, for sockaddr_in6
                let sin6 = unsafe {
                    &mut *(&mut raw.storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in6)
                };
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_port = v6.port().to_be();
                sin6.sin6_flowinfo = v6.flowinfo();
                sin6.sin6_addr.s6_addr = v6.ip().octets();
                sin6.sin6_scope_id = v6.scope_id();
                #[cfg(any(
                    target_os = "macos",
                    target_os = "ios",
                    target_os = "freebsd",
                    target_os = "openbsd",
                    target_os = "netbsd",
                    target_os = "dragonfly"
                ))]
                {
                    sin6.sin6_len = mem::size_of::<libc::sockaddr_in6>() as u8;
                }
                raw.len = mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;
            }
        }
        raw
    }

    /// Convert an IPv4/IPv6 address back to `SocketAddr`.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self.family() {
            libc::AF_INET => {
                // Safety: family says the storage holds a sockaddr_in
                let sin = unsafe {
                    &*(&self.storage as *const libc::sockaddr_storage as *const libc::sockaddr_in)
                };
                let ip = Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes());
                Some(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))))
            }
            libc::AF_INET6 => {
                // Safety: family says the storage holds a sockaddr_in6
                let sin6 = unsafe {
                    &*(&self.storage as *const libc::sockaddr_storage as *const libc::sockaddr_in6)
                };
                let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                Some(SocketAddr::V6(SocketAddrV6::new(
                    ip,
                    u16::from_be(sin6.sin6_port),
                    sin6.sin6_flowinfo,
                    sin6.sin6_scope_id,
                )))
            }
            _ => None,
        }
    }
}

impl Default for RawAddr {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for RawAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_socket_addr() {
            Some(addr) => write!(f, "RawAddr({})", addr),
            None => write!(f, "RawAddr(family={})", self.family()),
        }
    }
}

/// Shared, in-place refreshable address value.
pub struct SockAddr {
    raw: Mutex<RawAddr>,
}

impl SockAddr {
    /// Unresolved address (`AF_UNSPEC`).
    pub fn new() -> Self {
        Self::from_raw(RawAddr::zeroed())
    }

    pub fn from_raw(raw: RawAddr) -> Self {
        Self { raw: Mutex::new(raw) }
    }

    /// Wrap in a fresh ownership token.
    pub fn shared(self) -> AddrRef {
        Arc::new(self)
    }

    fn lock(&self) -> MutexGuard<'_, RawAddr> {
        self.raw.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current platform address.
    pub fn raw(&self) -> RawAddr {
        *self.lock()
    }

    /// Overwrite in place; every holder of the reference sees the update.
    pub fn set_raw(&self, raw: RawAddr) {
        *self.lock() = raw;
    }

    pub fn family(&self) -> i32 {
        self.lock().family()
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        self.lock().to_socket_addr()
    }
}

impl Default for SockAddr {
    fn default() -> Self {
        Self::new()
    }
}

impl From<SocketAddr> for SockAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::from_raw(RawAddr::from_socket_addr(&addr))
    }
}

impl fmt::Debug for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SockAddr").field(&self.raw()).finish()
    }
}

/// In-memory key registry for address values.
///
/// Keys are handed out in registration order and stay stable for the
/// registry's lifetime. The registry holds a strong reference to every
/// registered address.
#[derive(Default)]
pub struct AddrRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next: u32,
    by_key: HashMap<ObjectKey, AddrRef>,
}

impl AddrRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an address under an explicit key (used when restoring).
    pub fn insert(&self, key: ObjectKey, addr: AddrRef) {
        let mut inner = self.lock();
        inner.next = inner.next.max(key.0.saturating_add(1));
        inner.by_key.insert(key, addr);
    }

    pub fn len(&self) -> usize {
        self.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectKeys<SockAddr> for AddrRegistry {
    fn key_of(&self, obj: &AddrRef) -> ObjectKey {
        let mut inner = self.lock();
        if let Some((key, _)) = inner.by_key.iter().find(|(_, a)| Arc::ptr_eq(a, obj)) {
            return *key;
        }
        let key = ObjectKey(inner.next);
        inner.next += 1;
        inner.by_key.insert(key, Arc::clone(obj));
        key
    }

    fn resolve(&self, key: ObjectKey) -> Option<AddrRef> {
        self.lock().by_key.get(&key).cloned()
    }
}
