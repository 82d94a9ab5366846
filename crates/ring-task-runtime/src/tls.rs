//! Per-thread "which worker am I" state.
//!
//! A worker's own loop reaches its ring and ready queue directly through
//! `&mut self`, but code that runs *because of* a worker -- a woken
//! `Runnable`, `ring-task-io`'s submit hook, `ring-task`'s spawn hook --
//! has no such reference and needs a thread-local way back to "the
//! current worker's stuff" instead.
//!
//! Every pointer stashed here points at state a live `Worker::run` call
//! owns on its stack for as long as the thread-local is set; `set_*` and
//! `clear_*` bracket that call exactly the way `kprint::set_worker_id`
//! brackets it for logging.

use crate::worker::Runnable;
use ring_task_core::config::WorkerId;
use ring_task_core::cursor::ReadyQueue;
use ring_task_core::error::{Result, RuntimeError};
use std::cell::Cell;
use std::sync::Arc;

thread_local! {
    static CURRENT_WORKER_ID: Cell<Option<WorkerId>> = const { Cell::new(None) };
    static READY_QUEUE_PTR: Cell<*mut ()> = const { Cell::new(std::ptr::null_mut()) };
    static RING_PTR: Cell<*mut io_uring::IoUring> = const { Cell::new(std::ptr::null_mut()) };
    static TO_SUBMIT: Cell<u32> = const { Cell::new(0) };
    static TO_REAP: Cell<u32> = const { Cell::new(0) };
}

/// Mark this thread as worker `id`'s. Called once by `Worker::run`
/// before entering the event loop.
pub(crate) fn set_current_worker(id: WorkerId) {
    CURRENT_WORKER_ID.with(|c| c.set(Some(id)));
}

pub(crate) fn clear_current_worker() {
    CURRENT_WORKER_ID.with(|c| c.set(None));
}

/// The id of the worker running on the current thread, or `None` off a
/// worker thread entirely.
pub fn current_worker_id() -> Option<WorkerId> {
    CURRENT_WORKER_ID.with(|c| c.get())
}

pub(crate) fn set_ready_queue(queue: *mut ReadyQueue<Arc<Runnable>>) {
    READY_QUEUE_PTR.with(|c| c.set(queue as *mut ()));
}

pub(crate) fn clear_ready_queue() {
    READY_QUEUE_PTR.with(|c| c.set(std::ptr::null_mut()));
}

/// Push `runnable` onto the current thread's ready queue.
///
/// # Panics
///
/// Panics if the queue has no free slot (the runtime is over-committed
/// past `swap_capacity`) or if called on a thread with no worker
/// installed.
pub(crate) fn push_ready_local(runnable: Arc<Runnable>) {
    READY_QUEUE_PTR.with(|c| {
        let ptr = c.get() as *mut ReadyQueue<Arc<Runnable>>;
        assert!(
            !ptr.is_null(),
            "attempted to schedule a task on a thread with no worker ready queue installed"
        );
        // Safety: `ptr` was set by `Worker::run` to the address of its
        // own `ready` field, which it owns for the lifetime of the run
        // call; we're always called from that same thread while the
        // call is still on the stack.
        let queue = unsafe { &mut *ptr };
        if queue.push(runnable).is_err() {
            panic!("ready queue saturated: pushed past swap_capacity");
        }
    });
}

pub(crate) fn set_ring(ring: *mut io_uring::IoUring) {
    RING_PTR.with(|c| c.set(ring));
}

pub(crate) fn clear_ring() {
    RING_PTR.with(|c| c.set(std::ptr::null_mut()));
    TO_SUBMIT.with(|c| c.set(0));
    TO_REAP.with(|c| c.set(0));
}

/// Push `entry` onto the current thread's submission queue, flushing and
/// retrying once if it's full. This is the function installed as
/// `ring_task_io::reactor`'s submit hook and used directly for
/// cross-worker `msg_ring` posts.
///
/// Every successful push bumps `to_reap`: kernel operations started by
/// this worker but not yet completed, plus any cross-ring messages this
/// worker has sent that will return as completions here -- both cases
/// are exactly "an SQE was just handed to this ring", so one counter,
/// incremented in the one place an SQE is
/// ever queued, covers both.
pub(crate) fn submit_entry(entry: io_uring::squeue::Entry) -> Result<()> {
    RING_PTR.with(|c| {
        let ptr = c.get();
        assert!(
            !ptr.is_null(),
            "attempted to submit an SQE on a thread with no worker ring installed"
        );
        // Safety: same contract as `push_ready_local` above, for the ring.
        let ring = unsafe { &mut *ptr };
        let pushed = unsafe { ring.submission().push(&entry) };
        if pushed.is_err() {
            let _ = ring.submit();
            let retried = unsafe { ring.submission().push(&entry) };
            if retried.is_err() {
                return Err(RuntimeError::RingExhausted);
            }
        }
        TO_SUBMIT.with(|c| c.set(c.get() + 1));
        TO_REAP.with(|c| c.set(c.get() + 1));
        Ok(())
    })
}

/// Entries queued since the last submit, without resetting the count.
pub(crate) fn to_submit_count() -> u32 {
    TO_SUBMIT.with(|c| c.get())
}

/// Read and reset the queued-entries count, called right after an
/// actual `submit`/`submit_and_wait` call.
pub(crate) fn take_to_submit() -> u32 {
    TO_SUBMIT.with(|c| c.replace(0))
}

/// Kernel operations submitted by this worker (including cross-ring
/// sends) but not yet reaped as a completion.
pub(crate) fn to_reap_count() -> u32 {
    TO_REAP.with(|c| c.get())
}

/// Account for one more completion this worker will eventually see
/// without having submitted the matching SQE itself -- the `MsgRingDelivery`
/// case (`Worker::handle_cqe`), which otherwise would be wrongly cancelled
/// out by the generic per-CQE decrement every other tag gets.
pub(crate) fn increment_to_reap() {
    TO_REAP.with(|c| c.set(c.get() + 1));
}

/// Account for one fewer outstanding completion: called once per CQE
/// reaped, regardless of its tag.
pub(crate) fn decrement_to_reap() {
    TO_REAP.with(|c| c.set(c.get().saturating_sub(1)));
}
