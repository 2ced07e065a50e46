//! Socket persistence snapshots
//!
//! Descriptors cannot be persisted. A snapshot keeps what can: identity
//! (domain/type/protocol), the last error, the tag, and the host's stable
//! keys for the resolved local/remote addresses.
//!
//! # Encoding
//!
//! Packed little-endian:
//!
//! ```text
//! 0x00: domain      i32
//! 0x04: sock_type   i32
//! 0x08: protocol    i32
//! 0x0C: last_error  i32
//! 0x10: local key   u32 (u32::MAX = none)
//! 0x14: remote key  u32 (u32::MAX = none)
//! 0x18: tag         UTF-8 bytes to the end
//! ```
//!
//! # Restore order
//!
//! Addresses must be restored (made resolvable through the `ObjectKeys`
//! collaborator) before any socket that references them. `Pool::restore`
//! fails with `SockError::AddressNotRestored` otherwise.

use std::sync::Arc;

use sockpool_core::collab::{ObjectKey, ObjectKeys};
use sockpool_core::error::{SockError, SockResult};

use crate::addr::{AddrRef, SockAddr};
use crate::pool::{ConnState, Pool};
use crate::socket::{framing_for, Socket};
use crate::sys::INVALID_FD;

/// Size of the fixed header preceding the tag.
pub const SNAPSHOT_HEADER_LEN: usize = 24;

/// Persistable state of one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketSnapshot {
    pub domain: i32,
    pub sock_type: i32,
    pub protocol: i32,
    pub last_error: i32,
    pub local: Option<ObjectKey>,
    pub remote: Option<ObjectKey>,
    pub tag: String,
}

impl SocketSnapshot {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SNAPSHOT_HEADER_LEN + self.tag.len());
        out.extend_from_slice(&self.domain.to_le_bytes());
        out.extend_from_slice(&self.sock_type.to_le_bytes());
        out.extend_from_slice(&self.protocol.to_le_bytes());
        out.extend_from_slice(&self.last_error.to_le_bytes());
        out.extend_from_slice(&ObjectKey::to_raw(self.local).to_le_bytes());
        out.extend_from_slice(&ObjectKey::to_raw(self.remote).to_le_bytes());
        out.extend_from_slice(self.tag.as_bytes());
        out
    }

    /// Decode a record. Invalid UTF-8 in the tag is replaced, not rejected.
    pub fn decode(bytes: &[u8]) -> SockResult<Self> {
        if bytes.len() < SNAPSHOT_HEADER_LEN {
            return Err(SockError::Truncated {
                expected: SNAPSHOT_HEADER_LEN,
                got: bytes.len(),
            });
        }

        let word = |i: usize| -> [u8; 4] {
            let mut w = [0u8; 4];
            w.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            w
        };

        Ok(Self {
            domain: i32::from_le_bytes(word(0)),
            sock_type: i32::from_le_bytes(word(1)),
            protocol: i32::from_le_bytes(word(2)),
            last_error: i32::from_le_bytes(word(3)),
            local: ObjectKey::from_raw(u32::from_le_bytes(word(4))),
            remote: ObjectKey::from_raw(u32::from_le_bytes(word(5))),
            tag: String::from_utf8_lossy(&bytes[SNAPSHOT_HEADER_LEN..]).into_owned(),
        })
    }
}

impl Socket {
    /// Capture the persistable state. Addresses that were never resolved
    /// are not resolved here.
    pub fn snapshot(&self, keys: &dyn ObjectKeys<SockAddr>) -> SocketSnapshot {
        let (local, remote, last_error, tag) = self.persisted_parts();
        SocketSnapshot {
            domain: self.domain(),
            sock_type: self.sock_type(),
            protocol: self.protocol(),
            last_error,
            local: local.map(|a| keys.key_of(&a)),
            remote: remote.map(|a| keys.key_of(&a)),
            tag,
        }
    }
}

impl Pool {
    /// Rebuild a socket from a snapshot.
    ///
    /// The result carries the saved identity, error, tag and addresses but
    /// has no descriptor: it is permanently invalid until the host creates
    /// a fresh socket for it.
    pub fn restore(
        &self,
        snapshot: &SocketSnapshot,
        keys: &dyn ObjectKeys<SockAddr>,
    ) -> SockResult<Socket> {
        let resolve = |key: Option<ObjectKey>| -> SockResult<Option<AddrRef>> {
            match key {
                None => Ok(None),
                Some(k) => keys.resolve(k).map(Some).ok_or(SockError::AddressNotRestored(k)),
            }
        };
        let local = resolve(snapshot.local)?;
        let remote = resolve(snapshot.remote)?;

        let mut conn = ConnState::new(INVALID_FD, framing_for(snapshot.sock_type));
        conn.error = snapshot.last_error;
        conn.tag = snapshot.tag.clone();
        conn.local = local;
        conn.remote = remote;

        Ok(Socket::attach(
            Arc::clone(self.shared()),
            conn,
            snapshot.domain,
            snapshot.sock_type,
            snapshot.protocol,
        ))
    }
}
