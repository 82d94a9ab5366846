//! Compiled-in runtime constants.
//!
//! All of these can be overridden at process start via an environment
//! variable, read once and cached — see `runtime_config()`.

use crate::env::{env_get, env_get_bool};
use std::sync::OnceLock;

/// L1 cache line size, used to align per-worker hot state to avoid false
/// sharing between workers.
pub const CACHE_LINE_SIZE: usize = 64;

/// Ready-queue depth. Must be a power of two.
pub const SWAP_CAPACITY: u32 = 16_384;

/// `io_uring` queue depth: smallest power of two `>= 2 * SWAP_CAPACITY`.
pub const DEFAULT_RING_ENTRIES: u32 = (SWAP_CAPACITY * 2).next_power_of_two();

/// Batch-submit after this many prepared SQEs. `u32::MAX` means "unlimited"
/// (only submit when the worker loop explicitly decides to).
pub const SUBMISSION_THRESHOLD: u32 = u32::MAX;

/// Subtracted from every caller-requested timeout to compensate for
/// wake-up latency (nanoseconds, and therefore negative).
pub const TIMEOUT_BIAS_NS: i64 = -30_000;

/// `io_context_meta : thread = 1 : n`, `thread : worker = 1 : 1`,
/// `worker : task = 1 : m`. A worker id must fit in a byte.
pub type WorkerId = u8;

/// Maximum number of workers the registry can track. `WorkerId` is a
/// `u8`, so all 256 values `0..=255` must be valid worker ids.
pub const MAX_WORKERS: usize = WorkerId::MAX as usize + 1;

/// Runtime-resolved configuration: `config` values, each overridable by an
/// environment variable of the same shout-case name prefixed
/// `RING_TASK_`. Resolved once and cached for the life of the process.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub swap_capacity: u32,
    pub ring_entries: u32,
    pub submission_threshold: u32,
    pub timeout_bias_ns: i64,
    pub verbose: bool,
}

impl RuntimeConfig {
    fn from_env() -> Self {
        let swap_capacity: u32 = env_get("RING_TASK_SWAP_CAPACITY", SWAP_CAPACITY);
        assert!(
            swap_capacity.is_power_of_two(),
            "RING_TASK_SWAP_CAPACITY must be a power of two, got {swap_capacity}"
        );

        let ring_entries: u32 = env_get(
            "RING_TASK_RING_ENTRIES",
            (swap_capacity * 2).next_power_of_two(),
        );

        Self {
            swap_capacity,
            ring_entries,
            submission_threshold: env_get("RING_TASK_SUBMISSION_THRESHOLD", SUBMISSION_THRESHOLD),
            timeout_bias_ns: env_get("RING_TASK_TIMEOUT_BIAS_NS", TIMEOUT_BIAS_NS),
            verbose: env_get_bool("RING_TASK_VERBOSE", false),
        }
    }
}

static RUNTIME_CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// The process-wide runtime configuration, resolved from the environment
/// on first call and cached thereafter.
pub fn runtime_config() -> &'static RuntimeConfig {
    RUNTIME_CONFIG.get_or_init(RuntimeConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ring_entries_is_power_of_two_and_double_capacity() {
        assert!(DEFAULT_RING_ENTRIES.is_power_of_two());
        assert!(DEFAULT_RING_ENTRIES >= SWAP_CAPACITY * 2);
    }

    #[test]
    fn swap_capacity_is_power_of_two() {
        assert!(SWAP_CAPACITY.is_power_of_two());
    }
}
