//! Environment variable utilities
//!
//! Generic `env_get<T>` function for parsing environment variables with
//! defaults, so that the runtime's compiled-in constants (see `config`)
//! can be overridden for a single test run without recompiling.
//!
//! # Usage
//!
//! ```ignore
//! use ring_task_core::env::{env_get, env_get_bool};
//!
//! let entries: u32 = env_get("RING_TASK_RING_ENTRIES", 32768);
//! let verbose: bool = env_get_bool("RING_TASK_VERBOSE", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type `T`, or return `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as a boolean.
///
/// Accepts `"1"`, `"true"`, `"yes"`, `"on"` (case-insensitive) as true.
/// Everything else (including unset) returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_get_falls_back_to_default() {
        let v: u32 = env_get("RING_TASK_CORE_TEST_UNSET_KEY", 42);
        assert_eq!(v, 42);
    }

    #[test]
    fn env_get_bool_accepts_common_spellings() {
        std::env::set_var("RING_TASK_CORE_TEST_BOOL", "yes");
        assert!(env_get_bool("RING_TASK_CORE_TEST_BOOL", false));
        std::env::remove_var("RING_TASK_CORE_TEST_BOOL");
    }
}
