//! Environment variable utilities
//!
//! Small typed readers used by the pool configuration:
//!
//! ```ignore
//! use sockpool_core::env::{env_get, env_get_bool};
//!
//! let grace_ms: u64 = env_get("SOCKPOOL_SHUTDOWN_GRACE_MS", 2000);
//! let flush = env_get_bool("SOCKPOOL_FLUSH_EPRINT", false);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse an environment variable as `T`, falling back to `default` when it
/// is unset or does not parse.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Read a boolean flag. "1", "true", "yes", "on" (any case) are true;
/// anything else that is set is false. Unset yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if the variable is set and parses.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Duration given in milliseconds.
#[inline]
pub fn env_get_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}

/// Duration given in microseconds.
#[inline]
pub fn env_get_micros(key: &str, default_us: u64) -> Duration {
    Duration::from_micros(env_get(key, default_us))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__SOCKPOOL_TEST_UNSET__", 42);
        assert_eq!(val, 42);
        assert!(env_get_opt::<usize>("__SOCKPOOL_TEST_UNSET__").is_none());
        assert_eq!(env_get_str("__SOCKPOOL_TEST_UNSET__", "hello"), "hello");
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__SOCKPOOL_TEST_NUM__", " 123 ");
        let val: usize = env_get("__SOCKPOOL_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__SOCKPOOL_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__SOCKPOOL_TEST_BAD__", "not_a_number");
        let val: u64 = env_get("__SOCKPOOL_TEST_BAD__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__SOCKPOOL_TEST_BAD__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        for (raw, expected) in [("1", true), ("TRUE", true), ("on", true), ("0", false), ("garbage", false)] {
            std::env::set_var("__SOCKPOOL_TEST_BOOL__", raw);
            assert_eq!(env_get_bool("__SOCKPOOL_TEST_BOOL__", !expected), expected, "{}", raw);
        }
        std::env::remove_var("__SOCKPOOL_TEST_BOOL__");
        assert!(env_get_bool("__SOCKPOOL_TEST_BOOL__", true));
    }

    #[test]
    fn test_env_durations() {
        std::env::set_var("__SOCKPOOL_TEST_MS__", "250");
        assert_eq!(env_get_millis("__SOCKPOOL_TEST_MS__", 1), Duration::from_millis(250));
        std::env::remove_var("__SOCKPOOL_TEST_MS__");
        assert_eq!(env_get_micros("__SOCKPOOL_TEST_US__", 500), Duration::from_micros(500));
    }
}
