//! The link combinator: fuses several I/O awaitables into a single
//! kernel-ordered, short-circuiting chain.
//!
//! `std::ops::BitAnd` (`&`) is the chaining operator -- Rust's `&&` only
//! works on `bool`, and `&` is the closest overloadable operator with the
//! right associativity and binding power for `a & b & c` to read the way
//! the chain actually executes.

use io_uring::squeue;
use ring_task_core::task_info::{encode_user_data, TaskInfo, UserDataTag};
use std::future::Future;
use std::ops::BitAnd;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::ops::{IoFuture, IoOpDesc};
use crate::reactor::submit;

#[derive(PartialEq, Eq, Clone, Copy)]
enum State {
    Unsubmitted,
    Submitted,
    Done,
}

struct Stage {
    desc: Box<dyn IoOpDesc>,
    info: *mut TaskInfo,
    async_flag: bool,
}

/// A chain of two or more I/O awaitables built by `a & b & c & ...`,
/// submitted as a single `IOSQE_IO_LINK`-joined group. The kernel
/// short-circuits the chain on the first failure: later entries still
/// produce completions, but with a cancellation error rather than
/// actually running.
///
/// Only the final entry's `TaskInfo` carries the caller's waker; the
/// rest are tagged `TaskInfoPtrLinked` so their completions are
/// bookkept (and their memory reclaimed) without resuming anyone.
/// Awaiting a `Linked` resumes exactly once, with the final entry's
/// result.
pub struct Linked {
    stages: Vec<Stage>,
    state: State,
}

// Safety: see `IoFuture`'s `Send` impl -- every `Stage` only carries
// plain integers and caller-supplied raw pointers, and `info` is only
// ever dereferenced on the worker thread the chain was submitted to.
unsafe impl Send for Linked {}

impl<D1, D2> BitAnd<IoFuture<D2>> for IoFuture<D1>
where
    D1: IoOpDesc + 'static,
    D2: IoOpDesc + 'static,
{
    type Output = Linked;

    fn bitand(self, rhs: IoFuture<D2>) -> Linked {
        let (desc1, info1, async1) = self.into_link_parts();
        let (desc2, info2, async2) = rhs.into_link_parts();
        Linked {
            stages: vec![
                Stage { desc: desc1, info: info1, async_flag: async1 },
                Stage { desc: desc2, info: info2, async_flag: async2 },
            ],
            state: State::Unsubmitted,
        }
    }
}

impl<D> BitAnd<IoFuture<D>> for Linked
where
    D: IoOpDesc + 'static,
{
    type Output = Linked;

    fn bitand(mut self, rhs: IoFuture<D>) -> Linked {
        assert!(
            self.state == State::Unsubmitted,
            "cannot extend a link chain that has already been submitted"
        );
        let (desc, info, async_flag) = rhs.into_link_parts();
        self.stages.push(Stage { desc, info, async_flag });
        self
    }
}

impl Linked {
    fn final_info(&self) -> *mut TaskInfo {
        self.stages.last().expect("Linked chain must have at least one stage").info
    }
}

impl Future for Linked {
    type Output = i32;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<i32> {
        let this = self.get_mut();
        match this.state {
            State::Unsubmitted => {
                let last = this.stages.len() - 1;
                for (idx, stage) in this.stages.iter().enumerate() {
                    let is_final = idx == last;
                    let tag = if is_final {
                        UserDataTag::TaskInfoPtr
                    } else {
                        UserDataTag::TaskInfoPtrLinked
                    };
                    if is_final {
                        unsafe {
                            (*stage.info).waker = Some(cx.waker().clone());
                        }
                    }
                    let user_data = encode_user_data(stage.info, tag);
                    let mut flags = squeue::Flags::empty();
                    if !is_final {
                        flags |= squeue::Flags::IO_LINK;
                    }
                    if stage.async_flag {
                        flags |= squeue::Flags::ASYNC;
                    }
                    let entry = stage.desc.build_sqe().user_data(user_data).flags(flags);
                    submit(entry).expect("submission ring exhausted");
                }
                this.state = State::Submitted;
                Poll::Pending
            }
            State::Submitted => {
                let info = this.final_info();
                let done = unsafe { (*info).done };
                if done {
                    let result = unsafe { (*info).result };
                    this.state = State::Done;
                    Poll::Ready(result)
                } else {
                    unsafe {
                        (*info).waker = Some(cx.waker().clone());
                    }
                    Poll::Pending
                }
            }
            State::Done => panic!("Linked polled again after it already resolved"),
        }
    }
}

impl Drop for Linked {
    fn drop(&mut self) {
        for stage in self.stages.drain(..) {
            // Never submitted: the kernel has never seen this address,
            // free it outright.
            //
            // Submitted (or done): if the completion already arrived
            // (the common case -- the chain's earlier stages complete
            // strictly before the later ones, so by the time the final
            // stage is `Done` every stage is), free it now. Otherwise
            // the kernel still owns it; mark it orphaned so
            // `Worker::handle_cqe` frees it when the completion
            // eventually arrives instead of trying to resume anyone.
            let done = self.state == State::Unsubmitted || unsafe { (*stage.info).done };
            if done {
                unsafe { drop(Box::from_raw(stage.info)) };
            } else {
                unsafe { (*stage.info).orphaned = true };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Nop;
    use crate::reactor::{clear_submit_hook, set_submit_hook};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::Wake;

    struct NoopWaker;
    impl Wake for NoopWaker {
        fn wake(self: Arc<Self>) {}
    }

    fn noop_cx() -> Context<'static> {
        let waker = Box::leak(Box::new(std::task::Waker::from(Arc::new(NoopWaker))));
        Context::from_waker(waker)
    }

    static SUBMIT_COUNT: AtomicUsize = AtomicUsize::new(0);

    fn counting_hook_for_chain(_entry: squeue::Entry) -> Result<(), ring_task_core::error::RuntimeError> {
        SUBMIT_COUNT.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    #[test]
    fn chain_submits_one_entry_per_stage() {
        SUBMIT_COUNT.store(0, Ordering::SeqCst);
        set_submit_hook(counting_hook_for_chain);

        let mut chain = Nop::new() & Nop::new() & Nop::new();
        let mut cx = noop_cx();
        assert_eq!(Pin::new(&mut chain).poll(&mut cx), Poll::Pending);
        assert_eq!(SUBMIT_COUNT.load(Ordering::SeqCst), 3);
        clear_submit_hook();

        // Mark the final stage done so its `Drop` branch frees it
        // directly; the two earlier stages are left "in flight" on
        // purpose, exercising the orphan-marking branch for a chain
        // dropped before the kernel completes every entry.
        unsafe {
            let info = chain.final_info();
            (*info).done = true;
        }
        drop(chain);
    }

    #[test]
    fn resolves_to_final_stage_result() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn counting_hook(_entry: squeue::Entry) -> Result<(), ring_task_core::error::RuntimeError> {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        CALLS.store(0, Ordering::SeqCst);
        set_submit_hook(counting_hook);

        let mut chain = Nop::new() & Nop::new();
        let mut cx = noop_cx();
        assert_eq!(Pin::new(&mut chain).poll(&mut cx), Poll::Pending);
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);

        unsafe {
            let info = chain.final_info();
            (*info).result = 42;
            (*info).done = true;
        }
        match Pin::new(&mut chain).poll(&mut cx) {
            Poll::Ready(v) => assert_eq!(v, 42),
            Poll::Pending => panic!("expected the chain to resolve"),
        }
        clear_submit_hook();
    }
}
