//! Crate-wide error type.
//!
//! A hand-written enum with a manual `Display` impl rather than pulling in
//! `thiserror`. Every variant corresponds to a condition this runtime
//! cannot recover from — a startup barrier timeout, a null waker slot
//! reaching submission, an unrecognized user-data tag on completion. None
//! of these are meant to be recovered from; the type exists so callers can
//! log a clear message before unwinding rather than hitting a bare
//! `unwrap`.
//!
//! I/O results themselves are not folded into this type: a completed
//! operation's `res` field from the kernel flows back to the awaiting task
//! as a raw `i32`, exactly as `io_uring_cqe::res` does — see
//! `ring_task_io::ops`.

use std::fmt;

/// Errors raised by the runtime's own bookkeeping, as opposed to errors
/// reported by completed I/O operations.
#[derive(Debug)]
pub enum RuntimeError {
    /// `get_sqe()` found no free submission queue entry even after a
    /// flush-and-retry, because `ring_entries` callers queued more linked
    /// operations in one burst than the ring can hold.
    RingExhausted,

    /// The registry's startup barrier did not see every worker report
    /// ready within the configured timeout.
    StartupTimeout { expected: u8, ready: u8 },

    /// `spawn_on` could not hand a task to another worker because the
    /// cross-ring `msg_ring` submission itself failed.
    CrossPostFailed { target: u8, errno: i32 },

    /// A worker's ready queue tried to push a null `TaskInfo` pointer.
    /// Reaching this means a task was queued before it was fully
    /// constructed.
    NullHandlePushed,

    /// `handle_cqe` decoded a `user_data` tag it doesn't recognize. Only
    /// reachable if the kernel echoes back bits the runtime never set.
    UnknownTag(u64),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::RingExhausted => {
                write!(f, "submission ring exhausted after flush-and-retry")
            }
            RuntimeError::StartupTimeout { expected, ready } => write!(
                f,
                "startup barrier timed out: {ready}/{expected} workers reported ready"
            ),
            RuntimeError::CrossPostFailed { target, errno } => write!(
                f,
                "msg_ring to worker {target} failed with errno {errno}"
            ),
            RuntimeError::NullHandlePushed => {
                write!(f, "attempted to push a null task handle onto a ready queue")
            }
            RuntimeError::UnknownTag(tag) => {
                write!(f, "completion carried unrecognized user_data tag {tag:#x}")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Shorthand for `Result<T, RuntimeError>`.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Returns true if a completion result (`cqe.res`, or a `Poll::Ready`
/// payload from an I/O awaitable) is the kernel's `-ETIME`, i.e. a
/// `Timeout` operation's deadline elapsed rather than being cancelled or
/// failing outright.
///
/// Mirrors the bias applied in `config::RuntimeConfig::timeout_bias_ns`:
/// callers that race a `Timeout` against another operation via the link
/// combinator check this instead of comparing against a raw constant.
#[inline]
pub fn is_timeout(result: i32) -> bool {
    result == -libc::ETIME
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_non_empty() {
        let errs = [
            RuntimeError::RingExhausted,
            RuntimeError::StartupTimeout { expected: 4, ready: 2 },
            RuntimeError::CrossPostFailed { target: 1, errno: 11 },
            RuntimeError::NullHandlePushed,
            RuntimeError::UnknownTag(0xdead),
        ];
        for e in errs {
            assert!(!e.to_string().is_empty());
        }
    }

    #[test]
    fn is_timeout_matches_only_etime() {
        assert!(is_timeout(-libc::ETIME));
        assert!(!is_timeout(-libc::EINVAL));
        assert!(!is_timeout(0));
        assert!(!is_timeout(42));
    }
}
