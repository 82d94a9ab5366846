//! The thread-local hook an I/O awaitable uses to push its SQE onto the
//! current thread's worker ring, mirroring `ring_task::spawn`'s hook for
//! detached tasks and `ring_task_core::kprint`'s `set_worker_id` for
//! thread-tagging: the runtime installs it, this crate only calls it.
//!
//! `ring-task-io` cannot depend on `ring-task-runtime` (the dependency
//! runs the other way -- the runtime needs the op types to build its
//! worker loop), so the two are wired together through this thread-local
//! instead of a direct call.

use ring_task_core::error::RuntimeError;
use std::cell::Cell;

/// The function a worker installs on its own thread to accept a
/// prepared SQE for submission. Returns `Err` if the ring has no free
/// entry even after a flush-and-retry.
pub type SubmitFn = fn(io_uring::squeue::Entry) -> Result<(), RuntimeError>;

thread_local! {
    static SUBMIT_HOOK: Cell<Option<SubmitFn>> = const { Cell::new(None) };
}

/// Install the current thread's submit hook. Called once by
/// `ring_task_runtime::Worker::run` before entering the event loop.
pub fn set_submit_hook(hook: SubmitFn) {
    SUBMIT_HOOK.with(|h| h.set(Some(hook)));
}

/// Remove the current thread's submit hook.
pub fn clear_submit_hook() {
    SUBMIT_HOOK.with(|h| h.set(None));
}

/// Push `entry` onto the current thread's worker ring.
///
/// # Panics
///
/// Panics if called off a worker thread -- there is nowhere to put the
/// SQE.
pub(crate) fn submit(entry: io_uring::squeue::Entry) -> Result<(), RuntimeError> {
    SUBMIT_HOOK.with(|h| match h.get() {
        Some(hook) => hook(entry),
        None => panic!("I/O awaitable polled on a thread with no worker submit hook installed"),
    })
}
