//! The per-thread event loop: one `io_uring` instance, one ready queue,
//! one OS thread.
//!
//! Each iteration runs a `work()` / `submit()` / `complete()` triple:
//! drain the ready queue into polls, push any resulting SQEs, then reap
//! and dispatch completions. `Runnable` is this crate's stand-in for a
//! resumable coroutine frame: a boxed top-level future plus enough state
//! to make itself a `std::task::Waker` (see the mapping table in
//! `SPEC_FULL.md` §9).

use io_uring::{cqueue, squeue, IoUring};
use ring_task_core::config::{runtime_config, WorkerId};
use ring_task_core::cursor::ReadyQueue;
use ring_task_core::error::{Result, RuntimeError};
use ring_task_core::task_info::{decode_user_data, TaskInfo, UserDataTag};
use ring_task_core::{kdebug, kinfo, kwarn};
use std::cell::UnsafeCell;
use std::future::Future;
use std::os::unix::io::{AsRawFd, RawFd};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use crate::registry::registry;
use crate::tls;

/// A boxed top-level future plus the bookkeeping needed to resume it:
/// the idiomatic-Rust analogue of a coroutine frame address. The future
/// is only ever touched from the worker that owns it, which is why
/// `UnsafeCell` suffices instead of a lock.
pub struct Runnable {
    future: UnsafeCell<Pin<Box<dyn Future<Output = ()> + Send>>>,
    worker_id: WorkerId,
}

// Safety: `future` is polled only by `worker_id`'s own thread, from
// `Runnable::poll_once`; every other access is through `Wake`, which
// only ever reschedules, never touches the future directly.
unsafe impl Sync for Runnable {}

impl Runnable {
    pub(crate) fn new(worker_id: WorkerId, future: Pin<Box<dyn Future<Output = ()> + Send>>) -> Arc<Self> {
        Arc::new(Self {
            future: UnsafeCell::new(future),
            worker_id,
        })
    }

    /// Poll the wrapped future once, using `self` as its own waker.
    ///
    /// # Safety
    ///
    /// Must only be called by the worker thread identified by
    /// `self.worker_id` -- the same contract `IoFuture`/`Linked` place on
    /// dereferencing a `TaskInfo` pointer.
    fn poll_once(self: &Arc<Self>) -> Poll<()> {
        let waker = Waker::from(Arc::clone(self));
        let mut cx = Context::from_waker(&waker);
        let fut = unsafe { &mut *self.future.get() };
        fut.as_mut().poll(&mut cx)
    }

    /// Hand this runnable back to its owning worker's ready queue,
    /// either directly (if we're already on that thread) or through the
    /// registry's cross-worker posting (`spawn_on`).
    fn reschedule(self: Arc<Self>) {
        if tls::current_worker_id() == Some(self.worker_id) {
            tls::push_ready_local(self);
        } else {
            registry().spawn_on(self.worker_id, self);
        }
    }
}

impl Wake for Runnable {
    fn wake(self: Arc<Self>) {
        Runnable::reschedule(self);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        Runnable::reschedule(Arc::clone(self));
    }
}

/// One worker: an `io_uring` instance, a bounded ready queue of
/// `Runnable`s, and the `to_submit`/`to_reap` counters `work()`/
/// `submit()`/`complete()` use to decide when to talk to the kernel and
/// when the loop has gone quiescent.
pub struct Worker {
    id: WorkerId,
    ring: IoUring,
    ready: ReadyQueue<Arc<Runnable>>,
    stop: bool,
}

impl Worker {
    /// Build a worker and register its existence with the process-wide
    /// registry (`created_count += 1`). Does not start its thread or
    /// touch any thread-local state -- that's `run`.
    pub fn new(id: WorkerId) -> Result<Self> {
        let cfg = runtime_config();
        let ring = IoUring::builder()
            .build(cfg.ring_entries)
            .map_err(|_| RuntimeError::RingExhausted)?;
        registry().worker_created();
        Ok(Self {
            id,
            ring,
            ready: ReadyQueue::new(),
            stop: false,
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn ring_fd(&self) -> RawFd {
        self.ring.as_raw_fd()
    }

    /// Install this worker on the current thread, run `main` as its
    /// first task, then loop until quiescent shutdown.
    ///
    /// Consumes `self`: a worker only ever runs once, on the thread that
    /// calls this.
    pub fn run(mut self, main: impl Future<Output = ()> + Send + 'static) {
        let id = self.id;

        ring_task_io::reactor::set_submit_hook(Self::submit_hook);
        ring_task::set_spawn_hook(Self::spawn_hook);
        ring_task_core::kprint::set_worker_id(id);
        tls::set_current_worker(id);
        tls::set_ring(&mut self.ring as *mut IoUring);
        tls::set_ready_queue(&mut self.ready as *mut ReadyQueue<Arc<Runnable>>);

        let staged = registry().worker_ready(id, self.ring_fd());
        if let Err(e) = registry().wait_for_startup_barrier() {
            kwarn!("worker {id} startup barrier: {e}");
        }

        for runnable in staged {
            tls::push_ready_local(runnable);
        }
        tls::push_ready_local(Runnable::new(id, Box::pin(main)));

        kinfo!("worker {id} entering event loop");
        while !self.stop {
            self.run_iteration();
        }
        kinfo!("worker {id} quiescent shutdown");

        registry().worker_stopped(id);
        tls::clear_ready_queue();
        tls::clear_ring();
        tls::clear_current_worker();
        ring_task::clear_spawn_hook();
        ring_task_io::reactor::clear_submit_hook();
        ring_task_core::kprint::clear_worker_id();
    }

    fn submit_hook(entry: squeue::Entry) -> Result<()> {
        tls::submit_entry(entry)
    }

    fn spawn_hook(future: ring_task::BoxedUnitFuture) {
        let id = tls::current_worker_id().expect("spawn hook invoked off a worker thread");
        tls::push_ready_local(Runnable::new(id, future));
    }

    /// `work()` / `submit()` / `complete()`, in that order, exactly once.
    fn run_iteration(&mut self) {
        self.work();
        self.submit();
        self.complete();
    }

    /// Drain the ready queue, polling each runnable once. A runnable
    /// that returns `Pending` has already arranged its own resumption
    /// (an I/O awaitable registered its waker in a `TaskInfo`, or a
    /// nested `Task` propagated the same waker down further); `work()`
    /// does not requeue it itself.
    fn work(&mut self) {
        let cfg = runtime_config();
        let drained = self.ready.len();
        for _ in 0..drained {
            let Some(runnable) = self.ready.pop() else {
                break;
            };
            let _ = runnable.poll_once();

            if cfg.submission_threshold != u32::MAX
                && tls::to_submit_count() >= cfg.submission_threshold
            {
                let _ = self.ring.submit();
                tls::take_to_submit();
            }
        }
    }

    /// Hand any SQEs prepared during `work()` to the kernel. Blocks for
    /// exactly one completion when the ready queue is empty (nothing
    /// else for this thread to do); otherwise submits without waiting,
    /// since there's more ready work to get back to.
    fn submit(&mut self) {
        if tls::to_submit_count() == 0 {
            return;
        }
        let wait_for = if self.ready.is_empty() { 1 } else { 0 };
        let _ = self.ring.submit_and_wait(wait_for);
        tls::take_to_submit();
    }

    /// Reap whatever completions are available, dispatch each, and
    /// decide whether the loop is quiescent: no in-flight I/O, no ready
    /// work, and no other worker left to hand us anything. Otherwise,
    /// if there's nothing ready to poll right now but something could
    /// still land in this ring's completion queue -- our own in-flight
    /// I/O, or a cross-post from a worker that's still alive -- park in
    /// `wait_cqe` instead of spinning back through an empty
    /// `work`/`submit` pass.
    fn complete(&mut self) {
        let mut reaped = 0u32;
        for cqe in self.ring.completion() {
            self.handle_cqe(cqe);
            reaped += 1;
        }

        if reaped > 0 {
            return;
        }

        if tls::to_reap_count() == 0 && self.ready.is_empty() && registry().ready_count() <= 1 {
            self.stop = true;
            return;
        }

        if (tls::to_reap_count() > 0 || registry().ready_count() > 1)
            && self.ring.submit_and_wait(1).is_ok()
        {
            for cqe in self.ring.completion() {
                self.handle_cqe(cqe);
            }
        }
    }

    fn handle_cqe(&mut self, cqe: cqueue::Entry) {
        tls::decrement_to_reap();
        let (tag, ptr) = decode_user_data(cqe.user_data());
        match tag {
            UserDataTag::Nop => {}
            UserDataTag::None => {
                kwarn!("worker {} completion carried tag `None`", self.id);
            }
            UserDataTag::TaskInfoPtr => {
                let info = ptr.expect("TaskInfoPtr completion with a null pointer");
                self.resolve_task_info(info, cqe.result(), true);
            }
            UserDataTag::TaskInfoPtrLinked => {
                let info = ptr.expect("TaskInfoPtrLinked completion with a null pointer");
                self.resolve_task_info(info, cqe.result(), false);
            }
            UserDataTag::MsgRingDelivery => {
                // Safety: the only `MsgRingDelivery`-tagged value ever
                // posted is the one `Registry::post_cross_ring` packed
                // with `encode_waker_for_msg_ring`, and each delivery is
                // decoded at most once, right here.
                let waker = unsafe {
                    ring_task_core::task_info::decode_waker_from_msg_ring(cqe.user_data())
                };
                kdebug!("worker {} received cross-posted task", self.id);
                tls::increment_to_reap();
                waker.wake();
            }
            UserDataTag::RawCoroutineHandle => {
                // Safety: the only `RawCoroutineHandle`-tagged value ever
                // posted is one packed with `encode_raw_coroutine_handle`,
                // and each is decoded at most once, right here.
                let waker = unsafe {
                    ring_task_core::task_info::decode_raw_coroutine_handle(cqe.user_data())
                };
                waker.wake();
            }
        }
    }

    /// Write a completion's result into `info`, wake whoever's waiting
    /// on it (unless this is a non-final link in a chain), and reclaim
    /// the `TaskInfo` if its awaiting future already dropped it.
    fn resolve_task_info(&mut self, info: *mut TaskInfo, result: i32, wake: bool) {
        // Safety: `info` is only ever decoded from a `user_data` value
        // this runtime itself encoded, and only ever dereferenced here,
        // on the thread that owns the ring the operation was submitted
        // to.
        let orphaned = unsafe { (*info).orphaned };
        if orphaned {
            unsafe { drop(Box::from_raw(info)) };
            return;
        }
        unsafe {
            (*info).result = result;
            (*info).done = true;
        }
        if wake {
            let waker = unsafe { (*info).waker.take() };
            match waker {
                Some(waker) => waker.wake(),
                None => kwarn!("worker {} TaskInfo completed with no waker registered", self.id),
            }
        }
    }
}

/// Schedule `future` onto a specific worker, regardless of which thread
/// calls this from: an inline push if the caller is already on `target`'s
/// thread, an inline push if `target` hasn't started its ring yet (no
/// race is possible during start-up), or an `msg_ring` cross-post
/// otherwise -- the choice is made by `Registry::spawn_on`.
///
/// # Panics
///
/// Never panics itself; a failed cross-ring post is logged by the
/// registry and the task is dropped, matching `RuntimeError::
/// CrossPostFailed`'s documented fatality -- the sender has no fallback
/// path once the kernel submission for a cross-thread post fails.
pub fn spawn_on<F>(target: WorkerId, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let runnable = Runnable::new(target, Box::pin(future));
    registry().spawn_on(target, runnable);
}
