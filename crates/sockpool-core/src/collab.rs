//! Host collaborator contracts
//!
//! The host that embeds the pool owns object identity and persistence.
//! The pool only needs a stable key for every shared object it references,
//! and a way back from key to object when a snapshot is restored.

use core::fmt;
use std::sync::Arc;

/// Stable key assigned to a shared object by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(pub u32);

impl ObjectKey {
    /// Wire value meaning "no object".
    pub const NONE_RAW: u32 = u32::MAX;

    /// Encode an optional key as its wire value.
    #[inline]
    pub fn to_raw(key: Option<ObjectKey>) -> u32 {
        key.map_or(Self::NONE_RAW, |k| k.0)
    }

    /// Decode a wire value.
    #[inline]
    pub fn from_raw(raw: u32) -> Option<ObjectKey> {
        if raw == Self::NONE_RAW {
            None
        } else {
            Some(ObjectKey(raw))
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps shared objects to stable keys and back.
///
/// **Contract:**
/// - `key_of` returns the same key for the same object for as long as the
///   host tracks it.
/// - `resolve` only succeeds for objects that have already been restored.
///   Restore order is the caller's job: referenced objects first.
pub trait ObjectKeys<T>: Send + Sync {
    /// Key for an object, registering it if needed.
    fn key_of(&self, obj: &Arc<T>) -> ObjectKey;

    /// Object for a key, if it exists.
    fn resolve(&self, key: ObjectKey) -> Option<Arc<T>>;
}
